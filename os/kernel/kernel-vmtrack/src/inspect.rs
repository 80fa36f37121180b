//! # Inspection Surface
//!
//! Bounded copies of the bookkeeping tables into caller storage, for
//! diagnostic tooling. Both exports validate the requested maximum before
//! touching any lock and abort on the first rejected element.

use crate::context::MmContext;
use crate::ipt::ReverseMapping;
use kernel_alloc::PhysMapper;
use kernel_info::copy_out::CopyOut;
use kernel_info::inspect::{FrameInfo, InspectError, checked_maximum};
use kernel_info::memory::PFNNUM;
use kernel_memory_addresses::PhysicalAddress;

/// Copy up to `max` frame ownership rows, starting at frame zero.
///
/// # Errors
/// See [`FrameAllocator::export_rows`](kernel_alloc::FrameAllocator::export_rows).
pub fn dump_frames<M, O>(mm: &MmContext<M>, max: i64, out: &mut O) -> Result<usize, InspectError>
where
    M: PhysMapper,
    O: CopyOut<FrameInfo> + ?Sized,
{
    mm.frames().export_rows(max, out)
}

/// Copy up to `max` reverse mappings of the frame containing `pa`.
///
/// `pa` need not be page aligned. Returns the number of mappings copied,
/// which is zero for an unmapped frame or an uninitialized table.
///
/// # Errors
/// - [`InspectError::InvalidMaximum`] unless `1 <= max <= PFNNUM`.
/// - [`InspectError::Fault`] if `out` rejects a mapping.
pub fn reverse_lookup<M, O>(
    mm: &MmContext<M>,
    pa: PhysicalAddress,
    max: i64,
    out: &mut O,
) -> Result<usize, InspectError>
where
    M: PhysMapper,
    O: CopyOut<ReverseMapping> + ?Sized,
{
    let max = checked_maximum(max, PFNNUM)?;
    let frame = pa.align_down().frame();
    Ok(mm.ipt().copy_mappings(frame, max, out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_alloc::{FrameRange, SimulatedRam};
    use kernel_info::copy_out::CopyOutFault;
    use kernel_info::process::ProcessId;
    use kernel_memory_addresses::{VirtualAddress, VirtualPage};
    use kernel_vmem::PageFlags;

    const BLANK: ReverseMapping = ReverseMapping {
        owner: ProcessId::new(u32::MAX).unwrap(),
        page: VirtualPage::from_number(0),
        flags: PageFlags::new(),
    };

    fn mm() -> MmContext<SimulatedRam> {
        let range =
            FrameRange::new(PhysicalAddress::new(0x20_0000), PhysicalAddress::new(0x20_4000)).unwrap();
        let mm = MmContext::simulated(range);
        mm.init();
        mm
    }

    #[test]
    fn unaligned_address_finds_its_frame() {
        let mm = mm();
        let frame = mm.frames().allocate(ProcessId::new(3)).unwrap();
        mm.ipt().insert(
            frame,
            ProcessId::new(3).unwrap(),
            VirtualAddress::new(0x5000),
            PageFlags::user_rw(),
        );

        let mut out = [BLANK; 4];
        let n = reverse_lookup(&mm, frame.join(0x7ff), 4, out.as_mut_slice()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(out[0].page.base(), VirtualAddress::new(0x5000));
    }

    #[test]
    fn bad_maximum_copies_nothing() {
        let mm = mm();
        let mut out = [BLANK; 1];
        for max in [0, -3, PFNNUM as i64 + 1] {
            assert!(matches!(
                reverse_lookup(&mm, PhysicalAddress::new(0x20_0000), max, out.as_mut_slice()),
                Err(InspectError::InvalidMaximum { .. })
            ));
        }
    }

    #[test]
    fn short_destination_faults_frame_dump() {
        let mm = mm();
        let mut out = [FrameInfo::default(); 3];
        assert_eq!(
            dump_frames(&mm, 8, out.as_mut_slice()),
            Err(InspectError::Fault(CopyOutFault { index: 3 }))
        );
        assert_eq!(out[2].frame_index, 2);
    }
}
