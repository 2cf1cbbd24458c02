//! The root stack.

use crate::error::{VmError, VmResult};
use crate::object::ObjRef;

/// A bounded LIFO stack of object references, treated as the collector's root set.
#[derive(Debug, Clone)]
pub struct RootStack {
    slots: Vec<ObjRef>,
    capacity: usize,
}

impl RootStack {
    /// Creates an empty stack holding at most `capacity` references.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a reference.
    pub fn push(&mut self, obj: ObjRef) -> VmResult<()> {
        if self.slots.len() >= self.capacity {
            return Err(VmError::StackOverflow {
                capacity: self.capacity,
            });
        }

        self.slots.push(obj);

        Ok(())
    }

    /// Removes and returns the most recently pushed reference.
    pub fn pop(&mut self) -> VmResult<ObjRef> {
        self.slots.pop().ok_or(VmError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Returns the reference `depth` slots below the top (`0` is the top).
    pub fn peek(&self, depth: usize) -> Option<ObjRef> {
        let idx = self.slots.len().checked_sub(depth + 1)?;

        self.slots.get(idx).copied()
    }

    /// Fails with [`VmError::StackUnderflow`] unless at least `needed` references are present.
    pub fn require(&self, needed: usize) -> VmResult<()> {
        if self.slots.len() < needed {
            Err(VmError::StackUnderflow {
                needed,
                available: self.slots.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Returns the references from the bottom of the stack to the top.
    pub fn as_slice(&self) -> &[ObjRef] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn refs(n: usize) -> Vec<ObjRef> {
        let mut map = SlotMap::<ObjRef, ()>::with_key();

        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn lifo_order() {
        let r = refs(3);
        let mut stack = RootStack::new(4);

        for &obj in &r {
            stack.push(obj).unwrap();
        }

        assert_eq!(stack.peek(0), Some(r[2]));
        assert_eq!(stack.peek(2), Some(r[0]));
        assert_eq!(stack.peek(3), None);
        assert_eq!(stack.pop(), Ok(r[2]));
        assert_eq!(stack.pop(), Ok(r[1]));
        assert_eq!(stack.as_slice(), &r[..1]);
    }

    #[test]
    fn overflow_leaves_stack_untouched() {
        let r = refs(3);
        let mut stack = RootStack::new(2);

        stack.push(r[0]).unwrap();
        stack.push(r[1]).unwrap();

        assert_eq!(
            stack.push(r[2]),
            Err(VmError::StackOverflow { capacity: 2 })
        );
        assert_eq!(stack.as_slice(), &r[..2]);
    }

    #[test]
    fn underflow() {
        let mut stack = RootStack::new(2);

        assert_eq!(
            stack.pop(),
            Err(VmError::StackUnderflow {
                needed: 1,
                available: 0
            })
        );

        stack.push(refs(1)[0]).unwrap();

        assert_eq!(
            stack.require(2),
            Err(VmError::StackUnderflow {
                needed: 2,
                available: 1
            })
        );
        assert!(stack.require(1).is_ok());
    }
}
