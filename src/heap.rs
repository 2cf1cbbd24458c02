//! The object heap: allocation list, mark phase, and sweep phase.

use slotmap::SlotMap;
use tracing::trace;

use crate::object::{ObjRef, Object, Payload};

/// Storage for every live object.
///
/// Objects are kept in a slot map so that handles stay valid (and detectably stale once freed).
/// The allocation list threads through the objects' `link` fields, newest first.
#[derive(Debug, Default)]
pub struct Heap {
    objects: SlotMap<ObjRef, Object>,

    /// The most recently allocated object.
    first: Option<ObjRef>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new unmarked object and prepends it to the allocation list.
    pub fn insert(&mut self, payload: Payload) -> ObjRef {
        let mut object = Object::new(payload);
        object.link = self.first;

        let obj = self.objects.insert(object);
        self.first = Some(obj);

        obj
    }

    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        self.objects.get(obj)
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Object> {
        self.objects.get_mut(obj)
    }

    pub fn contains(&self, obj: ObjRef) -> bool {
        self.objects.contains_key(obj)
    }

    /// Returns the number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over the objects in allocation-list order (newest first).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            heap: self,
            cursor: self.first,
        }
    }

    /// Marks every object reachable from `roots`.
    ///
    /// Uses an explicit work list, so the depth of the object graph does not affect the native
    /// stack. An object that is already marked is never traced again, which makes cycles safe.
    pub fn mark(&mut self, roots: &[ObjRef]) -> usize {
        let mut worklist = roots.to_vec();
        let mut marked = 0;

        while let Some(obj) = worklist.pop() {
            let Some(object) = self.objects.get_mut(obj) else {
                continue;
            };

            if object.marked {
                continue;
            }

            object.marked = true;
            marked += 1;
            trace!(?obj, kind = %object.kind(), "mark");

            worklist.extend(object.children());
        }

        marked
    }

    /// Frees every unmarked object and clears the mark bit on the survivors.
    ///
    /// Returns the number of objects freed.
    pub fn sweep(&mut self) -> usize {
        let mut cursor = self.first;
        let mut last_live: Option<ObjRef> = None;
        let mut freed = 0;

        while let Some(obj) = cursor {
            let Some(object) = self.objects.get_mut(obj) else {
                unreachable!("allocation list refers to a freed object {obj:?}");
            };

            let next = object.link;

            if object.marked {
                object.marked = false;
                last_live = Some(obj);
            } else {
                match last_live.and_then(|prev| self.objects.get_mut(prev)) {
                    Some(prev) => prev.link = next,
                    None => self.first = next,
                }

                trace!(?obj, "free");
                self.objects.remove(obj);
                freed += 1;
            }

            cursor = next;
        }

        freed
    }

    /// Frees every object regardless of reachability.
    ///
    /// Returns the number of objects freed.
    pub fn free_all(&mut self) -> usize {
        let mut cursor = self.first.take();
        let mut freed = 0;

        while let Some(obj) = cursor {
            cursor = self.objects.remove(obj).and_then(|object| object.link);
            freed += 1;
        }

        debug_assert!(self.objects.is_empty());

        freed
    }
}

/// An iterator over the allocation list.
pub struct Iter<'a> {
    heap: &'a Heap,
    cursor: Option<ObjRef>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (ObjRef, &'a Object);

    fn next(&mut self) -> Option<Self::Item> {
        let obj = self.cursor?;
        let object = self.heap.objects.get(obj)?;
        self.cursor = object.link;

        Some((obj, object))
    }
}
