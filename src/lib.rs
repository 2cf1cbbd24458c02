//! A tiny VM with a stop-the-world mark-and-sweep garbage collector.
//!
//! The heap holds two kinds of objects: scalars and pairs of references, which may form arbitrary
//! (including cyclic) graphs. The VM's operand stack is the root set. Allocating an object
//! collects first if the number of live objects has reached the threshold; after each collection
//! the threshold is set to twice the number of survivors.
//!
//! The collector is usable from Rust through [`Vm`] and from C through the `babygc_*` functions
//! below, which operate on an opaque `Vm` pointer and pass object handles as `u64`.

pub mod config;
pub mod error;
pub mod heap;
pub mod object;
pub mod stack;
pub mod vm;

use std::ptr;

use libc::{c_int, size_t};
use nounwind::nounwind;
use slotmap::{Key, KeyData};

pub use config::VmConfig;
pub use error::{VmError, VmResult};
pub use object::{ObjKind, ObjRef, Object, Payload};
pub use vm::{CollectReport, GcStats, Vm};

/// Converts a handle to its C representation.
fn obj_to_ffi(obj: ObjRef) -> u64 {
    obj.data().as_ffi()
}

/// Converts a handle from its C representation.
fn obj_from_ffi(obj: u64) -> ObjRef {
    KeyData::from_ffi(obj).into()
}

/// Converts an optional handle from its C representation, where `0` stands for "absent".
fn opt_obj_from_ffi(obj: u64) -> Option<ObjRef> {
    (obj != 0).then(|| obj_from_ffi(obj))
}

/// Unwraps the result of a VM operation, treating errors as fatal.
fn fatal<T>(result: VmResult<T>) -> T {
    result.unwrap_or_else(|e| panic!("{e}"))
}

/// Dereferences an opaque VM pointer.
///
/// # Safety
/// `vm` must have been returned by [`babygc_vm_new`] or [`babygc_vm_new_with`] and not yet freed.
unsafe fn vm_mut<'a>(vm: *mut Vm) -> &'a mut Vm {
    assert!(!vm.is_null(), "null VM pointer");

    unsafe { &mut *vm }
}

#[unsafe(no_mangle)]
#[nounwind]
pub extern "C" fn babygc_vm_new() -> *mut Vm {
    Box::into_raw(Box::new(Vm::new()))
}

#[unsafe(no_mangle)]
#[nounwind]
pub extern "C" fn babygc_vm_new_with(stack_max: size_t, initial_threshold: size_t) -> *mut Vm {
    let config = VmConfig::default()
        .with_stack_max(stack_max)
        .with_initial_threshold(initial_threshold);

    Box::into_raw(Box::new(Vm::with_config(config)))
}

/// Frees the VM along with every object still on its heap.
#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_vm_free(vm: *mut Vm) {
    if !vm.is_null() {
        drop(unsafe { Box::from_raw(vm) });
    }
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_push_int(vm: *mut Vm, value: c_int) -> u64 {
    obj_to_ffi(fatal(unsafe { vm_mut(vm) }.push_int(value)))
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_push_pair(vm: *mut Vm) -> u64 {
    obj_to_ffi(fatal(unsafe { vm_mut(vm) }.push_pair()))
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_pop(vm: *mut Vm) -> u64 {
    obj_to_ffi(fatal(unsafe { vm_mut(vm) }.pop()))
}

/// Sets the head of a pair. A `value` of `0` clears it.
#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_set_head(vm: *mut Vm, pair: u64, value: u64) {
    fatal(unsafe { vm_mut(vm) }.set_first(obj_from_ffi(pair), opt_obj_from_ffi(value)))
}

/// Sets the tail of a pair. A `value` of `0` clears it.
#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_set_tail(vm: *mut Vm, pair: u64, value: u64) {
    fatal(unsafe { vm_mut(vm) }.set_second(obj_from_ffi(pair), opt_obj_from_ffi(value)))
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_gc(vm: *mut Vm) -> CollectReport {
    unsafe { vm_mut(vm) }.collect()
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_num_objects(vm: *mut Vm) -> size_t {
    unsafe { vm_mut(vm) }.num_objects()
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_print_stats(vm: *mut Vm) {
    let vm = unsafe { vm_mut(vm) };
    let stats = vm.stats();

    eprintln!(
        "  - All-time allocated: {} objects",
        stats.all_time_allocated_objs,
    );
    eprintln!("  - All-time freed: {} objects", stats.all_time_freed_objs);
    eprintln!("  - Live:");
    eprintln!("    - Currently {} objects", vm.num_objects());
    eprintln!("    - Max: {} objects", stats.max_live);
    eprintln!(
        "  - GC cycles: {} ({} automatic)",
        stats.gc_cycles, stats.auto_gc_cycles,
    );
    eprintln!("  - Next GC at: {} objects", vm.threshold());
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_print_state(vm: *mut Vm) {
    let vm = unsafe { vm_mut(vm) };

    eprintln!("GC state:");

    if vm.num_objects() == 0 {
        eprintln!("  - Heap: (empty)");
    } else {
        eprintln!("  - Heap (newest first):");

        for (obj, _) in vm.objects() {
            eprintln!("    - {}", vm.display_obj(obj, true));
        }
    }

    eprintln!();
    unsafe { babygc_print_roots(ptr::from_mut(vm)) };
    eprintln!();

    eprintln!(
        "  - Live: {} objects, next GC at {}",
        vm.num_objects(),
        vm.threshold(),
    );
    eprintln!(
        "  - Roots: {} / {} slots used",
        vm.stack_len(),
        vm.config().stack_max,
    );

    eprintln!();
}

#[unsafe(no_mangle)]
#[nounwind]
pub unsafe extern "C" fn babygc_print_roots(vm: *mut Vm) {
    let vm = unsafe { vm_mut(vm) };

    if vm.stack_len() == 0 {
        eprintln!("  - Roots: (none)");
        return;
    }

    eprintln!("  - Roots (top first):");

    for (depth, &root) in vm.roots().iter().rev().enumerate() {
        debug_assert!(vm.contains(root), "root {root:?} refers to a freed object");
        eprintln!("    - [{depth}] {}", vm.display_obj(root, true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_api_round_trip() {
        let vm = babygc_vm_new_with(16, 8);

        unsafe {
            babygc_push_int(vm, 1);
            babygc_push_int(vm, 2);
            let a = babygc_push_pair(vm);

            babygc_push_int(vm, 3);
            babygc_push_int(vm, 4);
            let b = babygc_push_pair(vm);

            babygc_set_tail(vm, a, b);
            babygc_set_tail(vm, b, a);

            // The replaced tails (2 and 4) are unreachable.
            let report = babygc_gc(vm);
            assert_eq!(
                report,
                CollectReport {
                    collected: 2,
                    remaining: 4
                }
            );
            assert_eq!(babygc_num_objects(vm), 4);

            babygc_print_roots(vm);

            babygc_print_state(vm);
            babygc_print_stats(vm);

            babygc_pop(vm);
            babygc_pop(vm);
            babygc_set_head(vm, a, 0);

            assert_eq!(babygc_gc(vm).remaining, 0);
            assert_eq!(babygc_num_objects(vm), 0);

            babygc_vm_free(vm);
        }
    }

    #[test]
    fn handles_survive_ffi_encoding() {
        let mut vm = Vm::new();
        let obj = vm.push_int(5).unwrap();

        assert_eq!(obj_from_ffi(obj_to_ffi(obj)), obj);
        assert_eq!(opt_obj_from_ffi(0), None);
    }
}
