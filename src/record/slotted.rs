//! Slotted page codec for variable-length records
//!
//! Page layout: a fixed header, a slot directory growing downward from the
//! header, free space, and a record heap growing upward from the page end.
//!
//! ```text
//! [Header][Slot Directory] ... free ... [Records]
//! ```
//!
//! Deleted slots become tombstones whose `offset` field threads an in-page
//! free chain, so slot ids stay valid across deletions. All multi-byte
//! fields are little-endian 16-bit signed integers. The codec performs no
//! I/O; it operates on page-sized byte buffers owned by the caller.

use super::error::{SlottedError, SlottedResult};
use crate::file::PAGE_SIZE;

/// Slot index within one page
pub type SlotId = i16;

/// Marker for "no slot" in cursors and the tombstone chain
pub const INVALID_SLOT: SlotId = -1;

/// Header: slot_count, free_list_head, free_ptr, attr_length (2 bytes each)
pub const HEADER_SIZE: usize = 8;

/// Directory entry: offset, length (2 bytes each)
pub const SLOT_SIZE: usize = 4;

/// Hard bound on directory entries for one page
pub const MAX_SLOTS: usize = (PAGE_SIZE - HEADER_SIZE) / SLOT_SIZE;

const SLOT_COUNT_OFFSET: usize = 0;
const FREE_LIST_OFFSET: usize = 2;
const FREE_PTR_OFFSET: usize = 4;
const ATTR_LENGTH_OFFSET: usize = 6;

fn read_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn write_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn slot_count(buf: &[u8]) -> i16 {
    read_i16(buf, SLOT_COUNT_OFFSET)
}

fn free_list_head(buf: &[u8]) -> i16 {
    read_i16(buf, FREE_LIST_OFFSET)
}

fn free_ptr(buf: &[u8]) -> i16 {
    read_i16(buf, FREE_PTR_OFFSET)
}

fn slot_pos(slot_id: SlotId) -> usize {
    HEADER_SIZE + slot_id as usize * SLOT_SIZE
}

fn slot_offset(buf: &[u8], slot_id: SlotId) -> i16 {
    read_i16(buf, slot_pos(slot_id))
}

fn slot_length(buf: &[u8], slot_id: SlotId) -> i16 {
    read_i16(buf, slot_pos(slot_id) + 2)
}

fn set_slot(buf: &mut [u8], slot_id: SlotId, offset: i16, length: i16) {
    write_i16(buf, slot_pos(slot_id), offset);
    write_i16(buf, slot_pos(slot_id) + 2, length);
}

/// Initialize an empty slotted page
pub fn init(buf: &mut [u8]) {
    debug_assert_eq!(buf.len(), PAGE_SIZE);
    buf.fill(0);
    write_i16(buf, SLOT_COUNT_OFFSET, 0);
    write_i16(buf, FREE_LIST_OFFSET, INVALID_SLOT);
    write_i16(buf, FREE_PTR_OFFSET, PAGE_SIZE as i16);
    write_i16(buf, ATTR_LENGTH_OFFSET, 0);
}

/// Advisory record-length hint stored in the header
pub fn attr_length(buf: &[u8]) -> i16 {
    read_i16(buf, ATTR_LENGTH_OFFSET)
}

pub fn set_attr_length(buf: &mut [u8], length: i16) {
    write_i16(buf, ATTR_LENGTH_OFFSET, length);
}

/// Bytes available between the directory and the record heap
pub fn free_space(buf: &[u8]) -> usize {
    let used = HEADER_SIZE + slot_count(buf) as usize * SLOT_SIZE;
    (free_ptr(buf) as usize).saturating_sub(used)
}

/// Sum of live record lengths on the page
pub fn used_bytes(buf: &[u8]) -> usize {
    (0..slot_count(buf))
        .map(|id| slot_length(buf, id))
        .filter(|&len| len > 0)
        .map(|len| len as usize)
        .sum()
}

/// Insert a record, compacting the page if fragmentation demands it
///
/// Returns the slot id assigned to the record. Tombstoned slots are reused
/// before the directory grows. Zero-length records are rejected.
pub fn insert(buf: &mut [u8], data: &[u8]) -> SlottedResult<SlotId> {
    debug_assert_eq!(buf.len(), PAGE_SIZE);

    if data.is_empty() || data.len() > i16::MAX as usize {
        return Err(SlottedError::NoSpace);
    }

    let need_slot_bytes = if free_list_head(buf) == INVALID_SLOT {
        SLOT_SIZE
    } else {
        0
    };
    ensure_space(buf, data.len() + need_slot_bytes)?;

    let slot_id = reserve_slot(buf)?;
    let dest = free_ptr(buf) as usize - data.len();
    buf[dest..dest + data.len()].copy_from_slice(data);
    write_i16(buf, FREE_PTR_OFFSET, dest as i16);
    set_slot(buf, slot_id, dest as i16, data.len() as i16);
    Ok(slot_id)
}

/// Tombstone a record, keeping its slot id reserved for reuse
pub fn delete(buf: &mut [u8], slot_id: SlotId) -> SlottedResult<()> {
    if slot_id < 0 || slot_id >= slot_count(buf) || slot_length(buf, slot_id) <= 0 {
        return Err(SlottedError::InvalidSlot(slot_id));
    }

    // The offset field of a tombstone holds the next free slot
    set_slot(buf, slot_id, free_list_head(buf), -1);
    write_i16(buf, FREE_LIST_OFFSET, slot_id);
    Ok(())
}

/// Get a live record's bytes
pub fn get(buf: &[u8], slot_id: SlotId) -> SlottedResult<&[u8]> {
    if slot_id < 0 || slot_id >= slot_count(buf) {
        return Err(SlottedError::InvalidSlot(slot_id));
    }
    let length = slot_length(buf, slot_id);
    if length <= 0 {
        return Err(SlottedError::InvalidSlot(slot_id));
    }
    let offset = slot_offset(buf, slot_id) as usize;
    Ok(&buf[offset..offset + length as usize])
}

/// Return the next live record after `cursor`, advancing it
///
/// Start iteration with `cursor = -1`; when the page is exhausted the
/// cursor resets to −1 and `Empty` is reported.
pub fn next_record<'a>(buf: &'a [u8], cursor: &mut i16) -> SlottedResult<(SlotId, &'a [u8])> {
    let start = if *cursor < 0 { 0 } else { *cursor + 1 };

    for slot_id in start..slot_count(buf) {
        let length = slot_length(buf, slot_id);
        if length > 0 {
            *cursor = slot_id;
            let offset = slot_offset(buf, slot_id) as usize;
            return Ok((slot_id, &buf[offset..offset + length as usize]));
        }
    }
    *cursor = INVALID_SLOT;
    Err(SlottedError::Empty)
}

fn reserve_slot(buf: &mut [u8]) -> SlottedResult<SlotId> {
    let head = free_list_head(buf);
    if head != INVALID_SLOT {
        write_i16(buf, FREE_LIST_OFFSET, slot_offset(buf, head));
        return Ok(head);
    }

    let count = slot_count(buf);
    if count as usize >= MAX_SLOTS {
        return Err(SlottedError::NoSpace);
    }
    write_i16(buf, SLOT_COUNT_OFFSET, count + 1);
    Ok(count)
}

fn ensure_space(buf: &mut [u8], needed: usize) -> SlottedResult<()> {
    if free_space(buf) >= needed {
        return Ok(());
    }
    compact(buf);
    if free_space(buf) >= needed {
        return Ok(());
    }
    Err(SlottedError::NoSpace)
}

/// Slide live records to the high end of the page, squeezing out holes
///
/// Only offsets change; slot ids are stable. Records are processed from
/// the highest current offset down so moves never overlap destructively.
fn compact(buf: &mut [u8]) {
    let count = slot_count(buf);
    let mut live: Vec<(i16, SlotId)> = (0..count)
        .filter(|&id| slot_length(buf, id) > 0)
        .map(|id| (slot_offset(buf, id), id))
        .collect();
    live.sort_by(|a, b| b.0.cmp(&a.0));

    let mut free_ptr = PAGE_SIZE;
    for (offset, slot_id) in live {
        let length = slot_length(buf, slot_id) as usize;
        free_ptr -= length;
        let src = offset as usize;
        if src != free_ptr {
            buf.copy_within(src..src + length, free_ptr);
            write_i16(buf, slot_pos(slot_id), free_ptr as i16);
        }
    }
    write_i16(buf, FREE_PTR_OFFSET, free_ptr as i16);
}
