// SPDX-License-Identifier: Apache-2.0

//! The on-disk file header (i-node).
//!
//! A header occupies exactly one sector: two length fields plus
//! `NUM_DIRECT` sector slots. Slot 0 is reserved as the chain pointer.
//! When the file fits in one header, slot 0's sector is claimed but
//! carries no data, keeping the layout uniform; when it does not, slot 0
//! names the sector of a next header covering the remainder, forming a
//! linked list of disk-resident index blocks.
//!
//! Chain walks are iterative with an in-memory cursor so the depth of a
//! large file never translates into stack depth.

use crate::bitmap::FreeMap;
use crate::disk::SectorDisk;
use crate::error::Error;
use crate::{NUM_DIRECT, SECTOR_SIZE, div_round_up};
use tracing::trace;

/// Slot value meaning "no sector assigned".
const UNASSIGNED: u32 = u32::MAX;

/// Bytes of file data indexed directly by one header.
const DIRECT_SPAN: u32 = ((NUM_DIRECT - 1) * SECTOR_SIZE) as u32;

// The serialised header must fill its sector exactly.
const _: () = assert!(8 + NUM_DIRECT * 4 == SECTOR_SIZE);

/// A file header: the total byte count, the data-sector count, and the
/// table of sector numbers.
#[derive(Debug, Clone)]
pub struct FileHeader {
    num_bytes: u32,
    num_sectors: u32,
    data_sectors: [u32; NUM_DIRECT],
}

impl FileHeader {
    /// Creates an empty header with every slot unassigned.
    pub fn new() -> Self {
        FileHeader {
            num_bytes: 0,
            num_sectors: 0,
            data_sectors: [UNASSIGNED; NUM_DIRECT],
        }
    }

    /// Number of bytes in the file.
    pub fn length(&self) -> u32 {
        self.num_bytes
    }

    /// Number of data sectors, excluding header sectors.
    pub fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    /// The raw slot table, for diagnostics.
    pub fn data_sectors(&self) -> &[u32; NUM_DIRECT] {
        &self.data_sectors
    }

    /// True when the extent spills into a chained header.
    pub fn is_chained(&self) -> bool {
        self.num_sectors + 1 > NUM_DIRECT as u32
    }

    /// Total sectors an allocation of `file_size` bytes will claim,
    /// chain overhead included: every header in the chain claims its
    /// slot 0 (a chain sector, or the uniform-layout spare on the final
    /// header) alongside its data sectors.
    pub fn sectors_to_claim(file_size: u32) -> u32 {
        let mut total = 0;
        let mut bytes = file_size;
        loop {
            let num_sectors = div_round_up(bytes, SECTOR_SIZE as u32);
            if num_sectors + 1 <= NUM_DIRECT as u32 {
                return total + num_sectors + 1;
            }
            total += NUM_DIRECT as u32;
            bytes -= DIRECT_SPAN;
        }
    }

    /// Allocates data sectors (and any chained headers) for a file of
    /// `file_size` bytes, zero-filling every claimed sector.
    ///
    /// The free-sector budget is checked up front, chain overhead
    /// included, so a fragmented map cannot fail the allocation midway.
    /// Chained headers are written to their chain sectors here; the first
    /// header is the caller's to write back.
    pub fn allocate<D: SectorDisk>(
        &mut self,
        free_map: &mut FreeMap,
        disk: &mut D,
        file_size: u32,
    ) -> Result<(), Error> {
        let needed = Self::sectors_to_claim(file_size);
        let available = free_map.num_clear();
        if available < needed {
            return Err(Error::DiskFull { needed, available });
        }

        let mut rest = self.fill_level(free_map, disk, file_size)?;
        let mut chain_sector = self.data_sectors[0];
        while let Some(bytes) = rest {
            let mut next = FileHeader::new();
            rest = next.fill_level(free_map, disk, bytes)?;
            next.write_back(disk, chain_sector)?;
            chain_sector = next.data_sectors[0];
        }
        trace!(file_size, sectors = needed, "allocated file extent");
        Ok(())
    }

    /// Claims and zero-fills the sectors of one chain level. Returns the
    /// byte count left for the next level, if this one overflowed.
    fn fill_level<D: SectorDisk>(
        &mut self,
        free_map: &mut FreeMap,
        disk: &mut D,
        bytes: u32,
    ) -> Result<Option<u32>, Error> {
        let zero = [0u8; SECTOR_SIZE];
        self.num_bytes = bytes;
        self.num_sectors = div_round_up(bytes, SECTOR_SIZE as u32);

        let (slots, overflow) = if self.num_sectors + 1 <= NUM_DIRECT as u32 {
            (self.num_sectors as usize + 1, None)
        } else {
            (NUM_DIRECT, Some(bytes - DIRECT_SPAN))
        };
        for i in 0..slots {
            let sector = free_map
                .find_and_set()
                .expect("free-sector budget checked before claiming");
            self.data_sectors[i] = sector;
            disk.write_sector(sector, &zero)?;
        }
        Ok(overflow)
    }

    /// Frees every sector of the extent, walking the chain. Each freed
    /// bit must have been set; the bitmap asserts it.
    pub fn deallocate<D: SectorDisk>(
        &self,
        free_map: &mut FreeMap,
        disk: &mut D,
    ) -> Result<(), Error> {
        let mut cursor = self.clone();
        loop {
            let next = if cursor.is_chained() {
                Some(FileHeader::fetch_from(disk, cursor.data_sectors[0])?)
            } else {
                None
            };
            let slots = (NUM_DIRECT as u32).min(cursor.num_sectors + 1) as usize;
            for i in 0..slots {
                free_map.clear(cursor.data_sectors[i]);
            }
            match next {
                Some(header) => cursor = header,
                None => return Ok(()),
            }
        }
    }

    /// Maps a byte offset within the file to the sector storing it,
    /// descending the chain for offsets beyond this header's direct span.
    pub fn byte_to_sector<D: SectorDisk>(
        &self,
        disk: &mut D,
        offset: u32,
    ) -> Result<u32, Error> {
        debug_assert!(offset < self.num_bytes, "offset beyond end of file");
        if offset < DIRECT_SPAN {
            return Ok(self.data_sectors[(offset / SECTOR_SIZE as u32 + 1) as usize]);
        }
        let mut cursor = FileHeader::fetch_from(disk, self.data_sectors[0])?;
        let mut offset = offset - DIRECT_SPAN;
        loop {
            if offset < DIRECT_SPAN {
                return Ok(cursor.data_sectors[(offset / SECTOR_SIZE as u32 + 1) as usize]);
            }
            cursor = FileHeader::fetch_from(disk, cursor.data_sectors[0])?;
            offset -= DIRECT_SPAN;
        }
    }

    /// Reads a header from its sector.
    pub fn fetch_from<D: SectorDisk>(disk: &mut D, sector: u32) -> Result<Self, Error> {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(sector, &mut buf)?;
        Ok(Self::from_bytes(&buf))
    }

    /// Writes the header to its sector.
    pub fn write_back<D: SectorDisk>(&self, disk: &mut D, sector: u32) -> Result<(), Error> {
        disk.write_sector(sector, &self.to_bytes())?;
        Ok(())
    }

    fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Self {
        let mut header = FileHeader::new();
        header.num_bytes = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        header.num_sectors = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        for (i, slot) in header.data_sectors.iter_mut().enumerate() {
            let at = 8 + i * 4;
            *slot = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        }
        header
    }

    fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        buf[4..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        for (i, slot) in self.data_sectors.iter().enumerate() {
            let at = 8 + i * 4;
            buf[at..at + 4].copy_from_slice(&slot.to_le_bytes());
        }
        buf
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::NUM_SECTORS;

    fn fresh() -> (MemDisk, FreeMap) {
        (MemDisk::new(), FreeMap::new())
    }

    #[test]
    fn test_serialisation_round_trip() {
        let mut disk = MemDisk::new();
        let mut header = FileHeader::new();
        header.num_bytes = 777;
        header.num_sectors = 7;
        header.data_sectors[0] = 99;
        header.data_sectors[NUM_DIRECT - 1] = 1001;
        header.write_back(&mut disk, 5).unwrap();

        let loaded = FileHeader::fetch_from(&mut disk, 5).unwrap();
        assert_eq!(loaded.num_bytes, 777);
        assert_eq!(loaded.num_sectors, 7);
        assert_eq!(loaded.data_sectors[0], 99);
        assert_eq!(loaded.data_sectors[NUM_DIRECT - 1], 1001);
    }

    #[test]
    fn test_small_file_claims_spare_slot() {
        let (mut disk, mut map) = fresh();
        let mut header = FileHeader::new();
        // 3 sectors of data; slot 0 is claimed but unused for data.
        header.allocate(&mut map, &mut disk, 300).unwrap();
        assert_eq!(header.num_sectors(), 3);
        assert!(!header.is_chained());
        assert_eq!(map.num_clear(), NUM_SECTORS - 4);
    }

    #[test]
    fn test_sectors_to_claim_accounts_for_chain() {
        // Fits in one header: data + spare slot 0.
        assert_eq!(FileHeader::sectors_to_claim(300), 4);
        // 8000 bytes: 63 data sectors. First header: 30 slots (1 chain +
        // 29 data); second: 30 slots (1 chain + 29 data); third: 5 data +
        // 1 spare = 6. Total 66.
        assert_eq!(FileHeader::sectors_to_claim(8000), 66);
    }

    #[test]
    fn test_chained_allocation_layout() {
        let (mut disk, mut map) = fresh();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, 8000).unwrap();

        // 8000 bytes => 63 data sectors overall.
        assert_eq!(header.num_sectors(), 63);
        assert!(header.is_chained());
        assert_eq!(map.num_clear(), NUM_SECTORS - 66);

        // The chain pointer leads to a header covering the remainder.
        let second = FileHeader::fetch_from(&mut disk, header.data_sectors()[0]).unwrap();
        assert_eq!(
            second.length(),
            8000 - DIRECT_SPAN
        );
        assert_eq!(second.num_sectors(), 63 - (NUM_DIRECT as u32 - 1));
        assert!(second.is_chained());

        let third = FileHeader::fetch_from(&mut disk, second.data_sectors()[0]).unwrap();
        assert_eq!(third.length(), 8000 - 2 * DIRECT_SPAN);
        assert!(!third.is_chained());
    }

    #[test]
    fn test_byte_to_sector_descends_chain() {
        let (mut disk, mut map) = fresh();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, 8000).unwrap();

        // An offset inside the first direct span resolves locally.
        let direct = header.byte_to_sector(&mut disk, 0).unwrap();
        assert_eq!(direct, header.data_sectors()[1]);

        // An offset past the direct span resolves in the chained header.
        let offset = DIRECT_SPAN + 32;
        let second = FileHeader::fetch_from(&mut disk, header.data_sectors()[0]).unwrap();
        let resolved = header.byte_to_sector(&mut disk, offset).unwrap();
        assert_eq!(resolved, second.data_sectors()[1]);

        // Deep offset: two levels down.
        let deep = 2 * DIRECT_SPAN + SECTOR_SIZE as u32;
        let third = FileHeader::fetch_from(&mut disk, second.data_sectors()[0]).unwrap();
        let resolved = header.byte_to_sector(&mut disk, deep).unwrap();
        assert_eq!(resolved, third.data_sectors()[2]);
    }

    #[test]
    fn test_deallocate_returns_every_sector() {
        let (mut disk, mut map) = fresh();
        let before = map.num_clear();

        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, 8000).unwrap();
        assert_eq!(map.num_clear(), before - 66);

        header.deallocate(&mut map, &mut disk).unwrap();
        assert_eq!(map.num_clear(), before);
    }

    #[test]
    fn test_deallocate_small_file_returns_spare_slot() {
        let (mut disk, mut map) = fresh();
        let before = map.num_clear();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, 300).unwrap();
        header.deallocate(&mut map, &mut disk).unwrap();
        assert_eq!(map.num_clear(), before);
    }

    #[test]
    fn test_allocation_fails_before_claiming_anything() {
        let (mut disk, mut map) = fresh();
        // Leave too few sectors free for an 8000-byte file.
        for _ in 0..NUM_SECTORS - 10 {
            let _ = map.find_and_set();
        }
        let before = map.num_clear();
        let mut header = FileHeader::new();
        match header.allocate(&mut map, &mut disk, 8000) {
            Err(Error::DiskFull { needed: 66, .. }) => (),
            other => panic!("expected DiskFull, got {other:?}"),
        }
        // The failed allocation claimed nothing.
        assert_eq!(map.num_clear(), before);
    }

    #[test]
    fn test_zero_length_file_claims_one_sector() {
        let (mut disk, mut map) = fresh();
        let mut header = FileHeader::new();
        header.allocate(&mut map, &mut disk, 0).unwrap();
        assert_eq!(header.num_sectors(), 0);
        assert_eq!(map.num_clear(), NUM_SECTORS - 1);
    }
}
