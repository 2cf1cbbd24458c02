//! The VM: root stack, heap, and the allocator that drives collection.

use std::fmt::{self, Display};

use tracing::{debug, info, trace};

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::heap::{self, Heap};
use crate::object::{ObjKind, ObjRef, Object, Payload};
use crate::stack::RootStack;

/// The outcome of a single collection cycle.
#[repr(C)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectReport {
    /// The number of objects freed.
    pub collected: usize,

    /// The number of objects that survived.
    pub remaining: usize,
}

impl Display for CollectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Collected {} objects, {} remaining.",
            self.collected, self.remaining,
        )
    }
}

/// What started a collection cycle.
#[derive(strum::Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
enum Trigger {
    /// The live count reached the threshold.
    Threshold,

    /// The heap hit its object limit.
    HeapFull,

    /// [`Vm::collect`] was called.
    Forced,
}

/// A half of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    First,
    Second,
}

/// Garbage collection statistics.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// The number of objects allocated since the VM was created.
    pub all_time_allocated_objs: usize,

    /// The number of objects freed since the VM was created.
    pub all_time_freed_objs: usize,

    /// The maximum number of simultaneously live objects.
    pub max_live: usize,

    /// The number of collection cycles, including forced ones.
    pub gc_cycles: usize,

    /// The number of collection cycles started by an allocation.
    pub auto_gc_cycles: usize,
}

/// A tiny VM with a mark-and-sweep garbage collector.
///
/// The root stack is the only root set. Every allocation first checks the live object count
/// against the threshold and collects if it has been reached; after each collection, the
/// threshold becomes twice the number of survivors.
#[derive(Debug)]
pub struct Vm {
    stack: RootStack,
    heap: Heap,

    /// The live object count that triggers the next collection.
    threshold: usize,

    config: VmConfig,
    stats: GcStats,

    /// The report of the most recent collection cycle.
    last_report: Option<CollectReport>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Creates a VM with an empty root stack and an empty heap.
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: RootStack::new(config.stack_max),
            heap: Heap::new(),
            threshold: config.initial_threshold,
            config,
            stats: Default::default(),
            last_report: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Returns the report of the most recent collection, automatic or forced.
    pub fn last_report(&self) -> Option<CollectReport> {
        self.last_report
    }

    /// Returns the live object count at which the next allocation collects.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns the number of live objects.
    pub fn num_objects(&self) -> usize {
        self.heap.len()
    }

    /// Pushes an existing object onto the root stack.
    pub fn push(&mut self, obj: ObjRef) -> VmResult<()> {
        if !self.heap.contains(obj) {
            return Err(VmError::DanglingRef(obj));
        }

        self.stack.push(obj)
    }

    /// Pops the topmost root.
    pub fn pop(&mut self) -> VmResult<ObjRef> {
        self.stack.pop()
    }

    /// Returns the root `depth` slots below the top of the stack.
    pub fn peek(&self, depth: usize) -> Option<ObjRef> {
        self.stack.peek(depth)
    }

    /// Returns the roots from the bottom of the stack to the top.
    pub fn roots(&self) -> &[ObjRef] {
        self.stack.as_slice()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Allocates a scalar and pushes it onto the root stack.
    pub fn push_int(&mut self, value: i32) -> VmResult<ObjRef> {
        if self.stack.len() >= self.stack.capacity() {
            return Err(VmError::StackOverflow {
                capacity: self.stack.capacity(),
            });
        }

        let obj = self.alloc(Payload::Scalar(value))?;
        self.stack.push(obj)?;

        Ok(obj)
    }

    /// Replaces the two topmost roots with a pair of them.
    ///
    /// The root pushed last becomes the pair's `second`, the one below it its `first`.
    pub fn push_pair(&mut self) -> VmResult<ObjRef> {
        self.stack.require(2)?;

        let (Some(second), Some(first)) = (self.stack.peek(0), self.stack.peek(1)) else {
            unreachable!("root stack holds at least two entries");
        };

        // Both halves stay on the stack until the pair exists, so a collection triggered here
        // keeps them alive.
        let obj = self.alloc(Payload::Pair {
            first: Some(first),
            second: Some(second),
        })?;

        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(obj)?;

        Ok(obj)
    }

    /// Runs a full collection cycle regardless of the threshold.
    pub fn collect(&mut self) -> CollectReport {
        self.gc(Trigger::Forced)
    }

    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        self.heap.get(obj)
    }

    /// Returns whether `obj` refers to a live object.
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.heap.contains(obj)
    }

    pub fn kind(&self, obj: ObjRef) -> VmResult<ObjKind> {
        Ok(self.object(obj)?.kind())
    }

    /// Returns the value of a scalar, or `None` for a pair.
    pub fn value(&self, obj: ObjRef) -> VmResult<Option<i32>> {
        Ok(self.object(obj)?.value())
    }

    /// Returns the head of a pair.
    pub fn first(&self, pair: ObjRef) -> VmResult<Option<ObjRef>> {
        self.expect_pair(pair).map(|(first, _)| first)
    }

    /// Returns the tail of a pair.
    pub fn second(&self, pair: ObjRef) -> VmResult<Option<ObjRef>> {
        self.expect_pair(pair).map(|(_, second)| second)
    }

    /// Replaces the head of a pair.
    pub fn set_first(&mut self, pair: ObjRef, value: Option<ObjRef>) -> VmResult<()> {
        self.set_child(pair, Side::First, value)
    }

    /// Replaces the tail of a pair.
    pub fn set_second(&mut self, pair: ObjRef, value: Option<ObjRef>) -> VmResult<()> {
        self.set_child(pair, Side::Second, value)
    }

    /// Iterates over live objects in allocation-list order (newest first).
    pub fn objects(&self) -> heap::Iter<'_> {
        self.heap.iter()
    }

    fn object(&self, obj: ObjRef) -> VmResult<&Object> {
        self.heap.get(obj).ok_or(VmError::DanglingRef(obj))
    }

    fn expect_pair(&self, obj: ObjRef) -> VmResult<(Option<ObjRef>, Option<ObjRef>)> {
        match *self.object(obj)?.payload() {
            Payload::Pair { first, second } => Ok((first, second)),
            Payload::Scalar(_) => Err(VmError::NotAPair {
                kind: ObjKind::Scalar,
            }),
        }
    }

    fn set_child(&mut self, pair: ObjRef, side: Side, value: Option<ObjRef>) -> VmResult<()> {
        if let Some(child) = value
            && !self.heap.contains(child)
        {
            return Err(VmError::DanglingRef(child));
        }

        let object = self.heap.get_mut(pair).ok_or(VmError::DanglingRef(pair))?;

        match &mut object.payload {
            Payload::Pair { first, .. } if side == Side::First => *first = value,
            Payload::Pair { second, .. } => *second = value,
            Payload::Scalar(_) => {
                return Err(VmError::NotAPair {
                    kind: ObjKind::Scalar,
                });
            }
        }

        Ok(())
    }

    /// Allocates a new object, collecting first if the threshold has been reached.
    fn alloc(&mut self, payload: Payload) -> VmResult<ObjRef> {
        let mut collected = false;

        if self.heap.len() >= self.threshold {
            self.gc(Trigger::Threshold);
            collected = true;
        }

        if self.heap.len() >= self.config.max_objects {
            if !collected {
                self.gc(Trigger::HeapFull);
            }

            if self.heap.len() >= self.config.max_objects {
                return Err(VmError::AllocationFailure {
                    limit: self.config.max_objects,
                });
            }
        }

        let obj = self.heap.insert(payload);
        trace!(?obj, kind = %payload.kind(), "alloc");

        self.stats.all_time_allocated_objs += 1;
        self.stats.max_live = self.stats.max_live.max(self.heap.len());

        Ok(obj)
    }

    /// Runs a stop-the-world mark-and-sweep cycle and recomputes the threshold.
    fn gc(&mut self, trigger: Trigger) -> CollectReport {
        let before = self.heap.len();
        debug!(%trigger, live = before, roots = self.stack.len(), "gc begin");

        let reached = self.heap.mark(self.stack.as_slice());
        let freed = self.heap.sweep();
        let remaining = self.heap.len();

        debug_assert_eq!(reached, remaining);
        debug_assert_eq!(before - freed, remaining);

        self.threshold = remaining * 2;

        self.stats.gc_cycles += 1;
        self.stats.all_time_freed_objs += freed;

        if trigger != Trigger::Forced {
            self.stats.auto_gc_cycles += 1;
        }

        let report = CollectReport {
            collected: freed,
            remaining,
        };

        info!("{report}");
        debug!(threshold = self.threshold, "gc end");

        self.last_report = Some(report);

        report
    }

    /// Formats an object.
    ///
    /// If `display_fields` is `false`, the children of a pair are elided from the output.
    pub fn display_obj(&self, obj: ObjRef, display_fields: bool) -> impl Display + '_ {
        struct Fmt<'a> {
            vm: &'a Vm,
            obj: ObjRef,
            display_fields: bool,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(object) = self.vm.heap.get(self.obj) else {
                    return write!(f, "**DANGLING** {:?}", self.obj);
                };

                let mark = if object.is_marked() { ", marked" } else { "" };
                write!(f, "<{} {:?}{mark}>", object.kind(), self.obj)?;

                match *object.payload() {
                    Payload::Scalar(value) => write!(f, " {value}"),
                    Payload::Pair { .. } if !self.display_fields => write!(f, " {{...}}"),

                    Payload::Pair { first, second } => {
                        write!(f, " {{ ")?;

                        for (idx, child) in [first, second].into_iter().enumerate() {
                            if idx > 0 {
                                write!(f, ", ")?;
                            }

                            match child {
                                Some(child) => write!(f, "{}", self.vm.display_obj(child, false))?,
                                None => write!(f, "nil")?,
                            }
                        }

                        write!(f, " }}")
                    }
                }
            }
        }

        Fmt {
            vm: self,
            obj,
            display_fields,
        }
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        let freed = self.heap.free_all();
        debug!(freed, "vm teardown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_vm_is_empty() {
        let vm = Vm::new();

        assert_eq!(vm.num_objects(), 0);
        assert_eq!(vm.stack_len(), 0);
        assert_eq!(vm.threshold(), crate::config::INITIAL_GC_THRESHOLD);
        assert_eq!(vm.stats(), &GcStats::default());
    }

    #[test]
    fn push_pair_orders_children() {
        let mut vm = Vm::new();
        let one = vm.push_int(1).unwrap();
        let two = vm.push_int(2).unwrap();
        let pair = vm.push_pair().unwrap();

        assert_eq!(vm.first(pair), Ok(Some(one)));
        assert_eq!(vm.second(pair), Ok(Some(two)));
        assert_eq!(vm.roots(), &[pair]);
    }

    #[test]
    fn push_pair_underflow_is_atomic() {
        let mut vm = Vm::new();
        let one = vm.push_int(1).unwrap();

        assert_eq!(
            vm.push_pair(),
            Err(VmError::StackUnderflow {
                needed: 2,
                available: 1
            })
        );
        assert_eq!(vm.roots(), &[one]);
        assert_eq!(vm.num_objects(), 1);
    }

    #[test]
    fn push_int_overflow_allocates_nothing() {
        let mut vm = Vm::with_config(VmConfig::default().with_stack_max(1));
        vm.push_int(1).unwrap();

        assert_eq!(
            vm.push_int(2),
            Err(VmError::StackOverflow { capacity: 1 })
        );
        assert_eq!(vm.num_objects(), 1);
        assert_eq!(vm.stats().all_time_allocated_objs, 1);
    }

    #[test]
    fn set_child_rejects_scalars_and_dangling_refs() {
        let mut vm = Vm::new();
        let one = vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        let pair = vm.push_pair().unwrap();

        assert_eq!(
            vm.set_first(one, Some(pair)),
            Err(VmError::NotAPair {
                kind: ObjKind::Scalar
            })
        );

        let garbage = vm.push_int(3).unwrap();
        vm.pop().unwrap();
        vm.collect();

        assert_eq!(
            vm.set_second(pair, Some(garbage)),
            Err(VmError::DanglingRef(garbage))
        );
        assert_eq!(vm.push(garbage), Err(VmError::DanglingRef(garbage)));

        vm.set_second(pair, None).unwrap();
        assert_eq!(vm.second(pair), Ok(None));
    }

    #[test]
    fn report_display() {
        let report = CollectReport {
            collected: 2,
            remaining: 0,
        };

        assert_eq!(report.to_string(), "Collected 2 objects, 0 remaining.");
    }

    #[test]
    fn display_obj_renders_children_one_level_deep() {
        let mut vm = Vm::new();
        vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        let inner = vm.push_pair().unwrap();
        vm.push_int(3).unwrap();
        let outer = vm.push_pair().unwrap();

        let full = vm.display_obj(outer, true).to_string();
        let elided = vm.display_obj(outer, false).to_string();

        assert!(full.starts_with("<pair "));
        assert!(full.contains(&format!("<pair {inner:?}> {{...}}")));
        assert!(full.ends_with("> 3 }"));
        assert!(elided.ends_with("{...}"));
    }

    #[test]
    fn stats_track_cycles() {
        let mut vm = Vm::with_config(VmConfig::default().with_initial_threshold(2));
        vm.push_int(1).unwrap();
        vm.pop().unwrap();
        vm.push_int(2).unwrap();
        vm.push_int(3).unwrap();
        vm.collect();

        let stats = *vm.stats();
        assert_eq!(stats.all_time_allocated_objs, 3);
        assert_eq!(stats.all_time_freed_objs, 1);
        assert_eq!(stats.gc_cycles, 2);
        assert_eq!(stats.auto_gc_cycles, 1);
        assert_eq!(stats.max_live, 2);
    }
}
