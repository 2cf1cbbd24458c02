/// The default root stack capacity.
pub const STACK_MAX: usize = 256;

/// The default number of live objects that triggers the first collection.
pub const INITIAL_GC_THRESHOLD: usize = 8;

/// The largest number of objects the heap can address at once.
pub const MAX_OBJECTS: usize = u32::MAX as usize - 1;

/// VM construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// The root stack capacity.
    pub stack_max: usize,

    /// The live object count that triggers the first automatic collection.
    ///
    /// Later thresholds are derived from the number of survivors.
    pub initial_threshold: usize,

    /// The maximum number of simultaneously live objects.
    ///
    /// An allocation that finds the heap at this limit after collecting fails with
    /// [`VmError::AllocationFailure`](crate::VmError::AllocationFailure).
    pub max_objects: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_max: STACK_MAX,
            initial_threshold: INITIAL_GC_THRESHOLD,
            max_objects: MAX_OBJECTS,
        }
    }
}

impl VmConfig {
    pub fn with_stack_max(self, stack_max: usize) -> Self {
        Self { stack_max, ..self }
    }

    pub fn with_initial_threshold(self, initial_threshold: usize) -> Self {
        Self {
            initial_threshold,
            ..self
        }
    }

    /// Sets the live object limit, clamped to what the heap can address.
    pub fn with_max_objects(self, max_objects: usize) -> Self {
        Self {
            max_objects: max_objects.min(MAX_OBJECTS),
            ..self
        }
    }
}
