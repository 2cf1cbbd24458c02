//! The heap object model.

use slotmap::new_key_type;

new_key_type! {
    /// A handle to a heap object.
    ///
    /// Handles are versioned: once the object is reclaimed, the handle no longer resolves, even if
    /// its slot is reused by a newer object.
    pub struct ObjRef;
}

/// An enumeration of object kinds.
#[derive(strum::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum ObjKind {
    /// An integer value.
    Scalar,

    /// A pair of (optional) references to other objects.
    Pair,
}

/// The contents of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// An integer value.
    Scalar(i32),

    /// A pair of references. Either side may be absent.
    Pair {
        /// The head of the pair.
        first: Option<ObjRef>,

        /// The tail of the pair.
        second: Option<ObjRef>,
    },
}

impl Payload {
    /// Returns the kind of object holding this payload.
    pub fn kind(&self) -> ObjKind {
        match self {
            Payload::Scalar(_) => ObjKind::Scalar,
            Payload::Pair { .. } => ObjKind::Pair,
        }
    }
}

/// A heap object.
#[derive(Debug, Clone)]
pub struct Object {
    /// Whether the object was reached during the current mark phase.
    ///
    /// Always `false` outside of a collection cycle.
    pub(crate) marked: bool,

    /// The next object in the allocation list.
    pub(crate) link: Option<ObjRef>,

    pub(crate) payload: Payload,
}

impl Object {
    pub(crate) fn new(payload: Payload) -> Self {
        Self {
            marked: false,
            link: None,
            payload,
        }
    }

    /// Returns the kind of the object.
    pub fn kind(&self) -> ObjKind {
        self.payload.kind()
    }

    /// Returns the object's payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the integer value if the object is a scalar.
    pub fn value(&self) -> Option<i32> {
        match self.payload {
            Payload::Scalar(value) => Some(value),
            Payload::Pair { .. } => None,
        }
    }

    /// Returns the head of the pair, or `None` if the object is a scalar or the head is absent.
    pub fn first(&self) -> Option<ObjRef> {
        match self.payload {
            Payload::Pair { first, .. } => first,
            Payload::Scalar(_) => None,
        }
    }

    /// Returns the tail of the pair, or `None` if the object is a scalar or the tail is absent.
    pub fn second(&self) -> Option<ObjRef> {
        match self.payload {
            Payload::Pair { second, .. } => second,
            Payload::Scalar(_) => None,
        }
    }

    /// Returns whether the mark bit is set.
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Returns the references held by the object.
    pub(crate) fn children(&self) -> impl Iterator<Item = ObjRef> {
        let (first, second) = match self.payload {
            Payload::Pair { first, second } => (first, second),
            Payload::Scalar(_) => (None, None),
        };

        first.into_iter().chain(second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_kebab_case() {
        assert_eq!(ObjKind::Scalar.to_string(), "scalar");
        assert_eq!(ObjKind::Pair.to_string(), "pair");
    }

    #[test]
    fn scalar_has_no_children() {
        let obj = Object::new(Payload::Scalar(7));

        assert_eq!(obj.kind(), ObjKind::Scalar);
        assert_eq!(obj.value(), Some(7));
        assert_eq!(obj.first(), None);
        assert_eq!(obj.children().count(), 0);
        assert!(!obj.is_marked());
    }

    #[test]
    fn pair_skips_absent_children() {
        let obj = Object::new(Payload::Pair {
            first: None,
            second: None,
        });

        assert_eq!(obj.kind(), ObjKind::Pair);
        assert_eq!(obj.value(), None);
        assert_eq!(obj.children().count(), 0);
    }
}
