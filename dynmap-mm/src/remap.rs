//! Explicit page remapping
//!
//! Re-points the virtual page containing `to` at the frame currently backing
//! the page containing `from`, without copying. The frame table is not
//! consulted or changed: it keeps mapping indices to the frames that first
//! backed them, while the page table records where frames are visible now.

use dynmap_api::{AccessMode, Error, Result};

use crate::page_table::PageTable;
use crate::virtual_mem::VirtAddr;

/// Access requested for a remapped page
///
/// Shared, readable and writable; a page table narrows it to the protection
/// of the mapping the target page lies in.
pub const REMAP_ACCESS: AccessMode = AccessMode::SHARED_RW;

/// Remap the page containing `to` onto the frame behind `from`.
///
/// The exclusive borrow of `page_table` is the address-space lock: the
/// caller holds it across the lookup, both removals and the install, so no
/// fault can observe the window where `to` has no entry.
///
/// # Errors
///
/// * `OutOfRange` if either address is outside every live mapping
/// * `NotMapped` if `from` has no installed entry; the page table is left untouched
pub fn remap<P>(page_table: &mut P, from: VirtAddr, to: VirtAddr) -> Result<()>
where
    P: PageTable + ?Sized,
{
    page_table.validate(from)?;
    page_table.validate(to)?;

    // Current frame, which may itself have arrived through an earlier remap.
    let frame = page_table.translate(from).ok_or(Error::NotMapped {
        addr: from.as_usize(),
    })?;
    let number = frame.number();

    let from_old = page_table.unmap_page(from);
    let to_old = page_table.unmap_page(to);
    page_table.map_page(to, frame, REMAP_ACCESS)?;

    mm_info!(
        "dynmap: remapped {} -> {} onto frame {} (replaced {})",
        from.page_base(),
        to.page_base(),
        number,
        to_old.as_ref().map_or("nothing", |_| "an entry")
    );

    drop(from_old);
    drop(to_old);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::pool::FramePool;
    use crate::page_table::SoftPageTable;
    use crate::range::{ManagedRange, RangeConfig};
    use alloc::sync::Arc;
    use dynmap_api::PAGE_SIZE;

    const BASE: usize = 0x10_0000;

    fn setup(pages: usize) -> (Arc<FramePool>, ManagedRange, SoftPageTable) {
        let pool = Arc::new(FramePool::default());
        let range = ManagedRange::open(
            pages * PAGE_SIZE,
            RangeConfig::new(pages * PAGE_SIZE),
            pool.clone(),
        )
        .unwrap();
        let table = SoftPageTable::with_window(BASE..BASE + pages * PAGE_SIZE);
        (pool, range, table)
    }

    fn fault_in(range: &ManagedRange, table: &mut SoftPageTable, page: usize) {
        let frame = range.resolve(page * PAGE_SIZE).unwrap();
        table
            .map_page(VirtAddr::new(BASE + page * PAGE_SIZE), frame, AccessMode::SHARED_RW)
            .unwrap();
    }

    #[test]
    fn test_remap_points_target_at_source_frame() {
        let (_pool, range, mut table) = setup(16);
        fault_in(&range, &mut table, 0);
        fault_in(&range, &mut table, 8);
        let source = range.frame_at(0).unwrap();
        let target = range.frame_at(8).unwrap();
        // table + page-table entry + local handle
        assert_eq!(source.ref_count(), 3);

        let from = VirtAddr::new(BASE);
        let to = VirtAddr::new(BASE + 8 * PAGE_SIZE);
        remap(&mut table, from, to).unwrap();

        assert!(table.translate(from).is_none());
        assert!(table.translate(to).unwrap().same_frame(&source));
        assert_eq!(table.entry(to).unwrap().mode(), REMAP_ACCESS);
        // from's entry went away, to's entry took its place
        assert_eq!(source.ref_count(), 3);
        // target lost its page-table reference but stays in the frame table
        assert_eq!(target.ref_count(), 2);
        assert!(range.frame_at(8).unwrap().same_frame(&target));
    }

    #[test]
    fn test_remap_follows_current_translation() {
        let (_pool, range, mut table) = setup(16);
        fault_in(&range, &mut table, 1);
        let first = range.frame_at(1).unwrap();

        let a = VirtAddr::new(BASE + PAGE_SIZE);
        let b = VirtAddr::new(BASE + 4 * PAGE_SIZE);
        let c = VirtAddr::new(BASE + 9 * PAGE_SIZE);
        remap(&mut table, a, b).unwrap();
        remap(&mut table, b, c).unwrap();

        assert!(table.translate(c).unwrap().same_frame(&first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remap_unmapped_source_leaves_table_alone() {
        let (pool, range, mut table) = setup(16);
        fault_in(&range, &mut table, 3);
        let before = table.translate(VirtAddr::new(BASE + 3 * PAGE_SIZE)).unwrap().to_vec();

        let err = remap(
            &mut table,
            VirtAddr::new(BASE),
            VirtAddr::new(BASE + 3 * PAGE_SIZE),
        )
        .unwrap_err();
        assert_eq!(err, Error::NotMapped { addr: BASE });

        let after = table.translate(VirtAddr::new(BASE + 3 * PAGE_SIZE)).unwrap();
        assert_eq!(after.to_vec(), before);
        assert_eq!(table.len(), 1);
        assert_eq!(pool.stats().allocations, 1);
    }

    #[test]
    fn test_remap_out_of_window() {
        let (_pool, range, mut table) = setup(4);
        fault_in(&range, &mut table, 0);
        let err = remap(
            &mut table,
            VirtAddr::new(BASE),
            VirtAddr::new(BASE + 4 * PAGE_SIZE),
        )
        .unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert!(table.translate(VirtAddr::new(BASE)).is_some());
    }

    #[test]
    fn test_remap_onto_itself() {
        let (_pool, range, mut table) = setup(4);
        fault_in(&range, &mut table, 2);
        let addr = VirtAddr::new(BASE + 2 * PAGE_SIZE);
        let frame = range.frame_at(2).unwrap();

        remap(&mut table, addr, addr).unwrap();
        assert!(table.translate(addr).unwrap().same_frame(&frame));
        assert_eq!(frame.ref_count(), 3);
    }
}
