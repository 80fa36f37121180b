use kernel_alloc::AllocError;
use kernel_vmem::VmemError;

/// Failures of the user address-space routines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("requested size {requested:#x} reaches beyond user space")]
    SizeLimit { requested: u64 },
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Vmem(#[from] VmemError),
}
