use kernel_alloc::{FrameRange, SimulatedRam};
use kernel_info::process::ProcessId;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress, VirtualPage};
use kernel_vmem::PageFlags;
use kernel_vmtrack::MmContext;
use kernel_vmtrack::uvm::ProcessMemory;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: u32 = 4;
const ROUNDS: u64 = 50;
const PAGE: u64 = 4096;

fn shared_mm(frames: u64) -> Arc<MmContext<SimulatedRam>> {
    let start = 0x200_0000;
    let range = FrameRange::new(
        PhysicalAddress::new(start),
        PhysicalAddress::new(start + frames * PAGE),
    )
    .unwrap();
    let mm = MmContext::simulated(range);
    mm.init();
    Arc::new(mm)
}

#[test]
fn concurrent_processes_keep_tables_consistent() {
    let mm = shared_mm(64);
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (1..=THREADS)
        .map(|n| {
            let mm = Arc::clone(&mm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let pid = ProcessId::new(n).unwrap();
                let mut image = ProcessMemory::new(pid);
                barrier.wait();
                for round in 0..ROUNDS {
                    let pages = round % 4 + 1;
                    image.grow(&mm, pages * PAGE).unwrap();
                    image
                        .write_bytes(&mm, VirtualAddress::new(0), &n.to_le_bytes())
                        .unwrap();
                    for p in 0..pages {
                        let t = image.translate(&mm, VirtualAddress::new(p * PAGE)).unwrap();
                        assert_eq!(Some(t.physical), image.space().query(VirtualAddress::new(p * PAGE)).map(|q| q.0));
                    }
                    let mut buf = [0u8; 4];
                    image.read_bytes(&mm, VirtualAddress::new(0), &mut buf).unwrap();
                    assert_eq!(u32::from_le_bytes(buf), n);
                    assert_eq!(mm.ipt().entries_of(pid), pages as usize);
                    image.shrink(&mm, 0);
                }
                image.destroy(&mm);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(mm.ipt().is_empty());
    assert_eq!(mm.frames().free_count(), 64);
    assert_eq!(mm.tlb().status().valid, 0);
}

#[test]
fn concurrent_shared_frame_refcounts_balance() {
    let mm = shared_mm(1);
    let frame = FrameNumber::new(0x200);
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (1..=THREADS)
        .map(|n| {
            let mm = Arc::clone(&mm);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let pid = ProcessId::new(n).unwrap();
                let va = VirtualPage::from_number(u64::from(n)).base();
                barrier.wait();
                for _ in 0..ROUNDS {
                    mm.ipt().insert(frame, pid, va, PageFlags::user_rw());
                }
                assert_eq!(mm.ipt().refcount(frame, pid, va), Some(ROUNDS as u32));
                for _ in 0..ROUNDS {
                    mm.ipt().remove(frame, pid, va);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert!(mm.ipt().lookup_by_frame(frame, 16).is_empty());
    assert_eq!(mm.ipt().status().operations, 2 * ROUNDS * u64::from(THREADS));
}
