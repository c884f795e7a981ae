// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! GigaDevice GD25Q128E SPI NOR flash.
//!
//! Works over any [`SpiDevice`]; on this chip that is usually [`crate::hw::Spi`] with a
//! hardware chip select. Every command is one CS assertion. Program and erase commands are
//! preceded by `WRITE_ENABLE` and followed by polling `WIP` in status register 1.

use embedded_hal::spi::{Operation, SpiDevice};

/// Command opcodes.
pub mod cmd {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const READ_STATUS_REG_1: u8 = 0x05;
    pub const READ_STATUS_REG_2: u8 = 0x35;
    pub const WRITE_STATUS_REG_1: u8 = 0x01;
    pub const READ_DATA: u8 = 0x03;
    pub const FAST_READ: u8 = 0x0B;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const SECTOR_ERASE: u8 = 0x20;
    pub const BLOCK_ERASE_32K: u8 = 0x52;
    pub const BLOCK_ERASE_64K: u8 = 0xD8;
    pub const CHIP_ERASE: u8 = 0xC7;
    pub const POWER_DOWN: u8 = 0xB9;
    pub const RELEASE_POWER_DOWN: u8 = 0xAB;
    pub const DEVICE_ID: u8 = 0xAB;
    pub const MANUFACTURER_ID: u8 = 0x90;
    pub const JEDEC_ID: u8 = 0x9F;
}

pub const PAGE_SIZE: u32 = 256;
pub const SECTOR_SIZE: u32 = 4 * 1024;
pub const BLOCK_32K_SIZE: u32 = 32 * 1024;
pub const BLOCK_64K_SIZE: u32 = 64 * 1024;
pub const CAPACITY: u32 = 16 * 1024 * 1024;

/// GigaDevice manufacturer code.
pub const MANUFACTURER_GIGADEVICE: u8 = 0xC8;

/// Status register 1, write in progress.
const SR1_WIP: u8 = 1 << 0;

/// Status polls before [`Error::Busy`].
const BUSY_POLLS: u32 = 0x10_0000;

/// Identification commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdKind {
    /// `0x9F`: manufacturer, memory type, capacity.
    Jedec,
    /// `0xAB`: three dummy bytes, then the device ID.
    Device,
    /// `0x90`: 24-bit zero address, then manufacturer and device ID.
    ManufacturerDevice,
}

impl IdKind {
    fn opcode(self) -> u8 {
        match self {
            IdKind::Jedec => cmd::JEDEC_ID,
            IdKind::Device => cmd::DEVICE_ID,
            IdKind::ManufacturerDevice => cmd::MANUFACTURER_ID,
        }
    }

    /// Bytes clocked between the opcode and the ID.
    fn dummy_len(self) -> usize {
        match self {
            IdKind::Jedec => 0,
            IdKind::Device | IdKind::ManufacturerDevice => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadMode {
    /// `0x03`, up to 80 MHz.
    Normal,
    /// `0x0B`, one dummy byte after the address.
    Fast,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Erase {
    Sector,
    Block32K,
    Block64K,
}

impl Erase {
    pub fn size(self) -> u32 {
        match self {
            Erase::Sector => SECTOR_SIZE,
            Erase::Block32K => BLOCK_32K_SIZE,
            Erase::Block64K => BLOCK_64K_SIZE,
        }
    }

    fn opcode(self) -> u8 {
        match self {
            Erase::Sector => cmd::SECTOR_ERASE,
            Erase::Block32K => cmd::BLOCK_ERASE_32K,
            Erase::Block64K => cmd::BLOCK_ERASE_64K,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Spi(E),
    /// `WIP` stayed set.
    Busy,
    /// Address range falls outside the array.
    OutOfBounds,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Spi(e)
    }
}

/// JEDEC identification triple.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

impl JedecId {
    /// Array size in bytes, from the `2^n` capacity code.
    pub fn size(&self) -> Option<u32> {
        1u32.checked_shl(self.capacity as u32)
    }
}

#[inline]
fn address(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

pub struct SpiFlash<D> {
    spi: D,
}

impl<D> SpiFlash<D>
where
    D: SpiDevice<u8>,
{
    pub fn new(spi: D) -> Self {
        Self { spi }
    }

    pub fn free(self) -> D {
        self.spi
    }

    /// Fill `out` with the identification bytes of `kind`. Returns how many were read.
    pub fn read_id(&mut self, kind: IdKind, out: &mut [u8]) -> Result<usize, Error<D::Error>> {
        let dummy = [0u8; 3];
        let len = out.len();
        self.spi.transaction(&mut [
            Operation::Write(&[kind.opcode()]),
            Operation::Write(&dummy[..kind.dummy_len()]),
            Operation::Read(out),
        ])?;
        Ok(len)
    }

    pub fn jedec_id(&mut self) -> Result<JedecId, Error<D::Error>> {
        let mut id = [0u8; 3];
        self.read_id(IdKind::Jedec, &mut id)?;
        Ok(JedecId {
            manufacturer: id[0],
            memory_type: id[1],
            capacity: id[2],
        })
    }

    pub fn device_id(&mut self) -> Result<u8, Error<D::Error>> {
        let mut id = [0u8; 1];
        self.read_id(IdKind::Device, &mut id)?;
        Ok(id[0])
    }

    /// `(manufacturer, device)`.
    pub fn manufacturer_device_id(&mut self) -> Result<(u8, u8), Error<D::Error>> {
        let mut id = [0u8; 2];
        self.read_id(IdKind::ManufacturerDevice, &mut id)?;
        Ok((id[0], id[1]))
    }

    pub fn read_status(&mut self) -> Result<u8, Error<D::Error>> {
        let mut buf = [cmd::READ_STATUS_REG_1, 0];
        self.spi.transfer_in_place(&mut buf)?;
        Ok(buf[1])
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<D::Error>> {
        Ok(self.read_status()? & SR1_WIP != 0)
    }

    /// Poll status register 1 until the current program/erase completes.
    pub fn wait_ready(&mut self) -> Result<(), Error<D::Error>> {
        for _ in 0..BUSY_POLLS {
            if !self.is_busy()? {
                return Ok(());
            }
        }
        warn!("flash busy timeout");
        Err(Error::Busy)
    }

    pub fn write_enable(&mut self) -> Result<(), Error<D::Error>> {
        self.spi.write(&[cmd::WRITE_ENABLE])?;
        Ok(())
    }

    pub fn write_disable(&mut self) -> Result<(), Error<D::Error>> {
        self.spi.write(&[cmd::WRITE_DISABLE])?;
        Ok(())
    }

    /// Write status register 1 and wait for the write cycle.
    pub fn write_status(&mut self, status: u8) -> Result<(), Error<D::Error>> {
        self.write_enable()?;
        self.spi.write(&[cmd::WRITE_STATUS_REG_1, status])?;
        self.wait_ready()
    }

    /// Erase the sector or block containing `addr`.
    pub fn erase(&mut self, kind: Erase, addr: u32) -> Result<(), Error<D::Error>> {
        if addr >= CAPACITY {
            return Err(Error::OutOfBounds);
        }
        let a = address(addr & !(kind.size() - 1));
        self.write_enable()?;
        self.spi.write(&[kind.opcode(), a[0], a[1], a[2]])?;
        self.wait_ready()
    }

    pub fn sector_erase(&mut self, addr: u32) -> Result<(), Error<D::Error>> {
        self.erase(Erase::Sector, addr)
    }

    /// 32 KiB block erase.
    pub fn block_erase(&mut self, addr: u32) -> Result<(), Error<D::Error>> {
        self.erase(Erase::Block32K, addr)
    }

    pub fn chip_erase(&mut self) -> Result<(), Error<D::Error>> {
        self.write_enable()?;
        self.spi.write(&[cmd::CHIP_ERASE])?;
        self.wait_ready()
    }

    /// Program up to one page. Bytes past the end of `addr`'s page are dropped rather than
    /// wrapped to its start.
    pub fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<usize, Error<D::Error>> {
        if addr >= CAPACITY {
            return Err(Error::OutOfBounds);
        }
        let room = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
        let len = data.len().min(room);
        let a = address(addr);
        self.write_enable()?;
        self.spi.transaction(&mut [
            Operation::Write(&[cmd::PAGE_PROGRAM, a[0], a[1], a[2]]),
            Operation::Write(&data[..len]),
        ])?;
        self.wait_ready()?;
        Ok(len)
    }

    /// Program `data` starting at `addr`, splitting on page boundaries.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<D::Error>> {
        if addr as u64 + data.len() as u64 > CAPACITY as u64 {
            return Err(Error::OutOfBounds);
        }
        let mut addr = addr;
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.page_program(addr, rest)?;
            addr += n as u32;
            rest = &rest[n..];
        }
        Ok(())
    }

    pub fn read(&mut self, mode: ReadMode, addr: u32, buf: &mut [u8]) -> Result<(), Error<D::Error>> {
        if addr as u64 + buf.len() as u64 > CAPACITY as u64 {
            return Err(Error::OutOfBounds);
        }
        let a = address(addr);
        match mode {
            ReadMode::Normal => self.spi.transaction(&mut [
                Operation::Write(&[cmd::READ_DATA, a[0], a[1], a[2]]),
                Operation::Read(buf),
            ])?,
            ReadMode::Fast => self.spi.transaction(&mut [
                Operation::Write(&[cmd::FAST_READ, a[0], a[1], a[2], 0]),
                Operation::Read(buf),
            ])?,
        }
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<(), Error<D::Error>> {
        self.spi.write(&[cmd::POWER_DOWN])?;
        Ok(())
    }

    pub fn release_power_down(&mut self) -> Result<(), Error<D::Error>> {
        self.spi.write(&[cmd::RELEASE_POWER_DOWN])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::spi::ErrorType;

    /// Records MOSI per transaction and serves a tiny flash model on MISO.
    struct FakeFlash {
        mem: Vec<u8>,
        status: Vec<u8>,
        log: Vec<Vec<u8>>,
        write_enabled: bool,
    }

    impl FakeFlash {
        fn new() -> Self {
            Self {
                mem: vec![0xFF; 0x4000],
                status: Vec::new(),
                log: Vec::new(),
                write_enabled: false,
            }
        }

        fn addr(frame: &[u8]) -> usize {
            ((frame[1] as usize) << 16) | ((frame[2] as usize) << 8) | frame[3] as usize
        }

        fn respond(&mut self, mosi: &[u8], pos: usize) -> u8 {
            match mosi[0] {
                cmd::JEDEC_ID => [0xC8, 0x40, 0x18][pos - 1],
                cmd::DEVICE_ID => 0x17,
                cmd::MANUFACTURER_ID => [0xC8, 0x17][pos - 4],
                cmd::READ_STATUS_REG_1 => {
                    if self.status.is_empty() {
                        0
                    } else {
                        self.status.remove(0)
                    }
                }
                cmd::READ_DATA => self.mem[Self::addr(mosi) + pos - 4],
                cmd::FAST_READ => self.mem[Self::addr(mosi) + pos - 5],
                _ => 0,
            }
        }

        fn finish(&mut self, frame: Vec<u8>) {
            match frame[0] {
                cmd::WRITE_ENABLE => self.write_enabled = true,
                cmd::PAGE_PROGRAM if self.write_enabled => {
                    let base = Self::addr(&frame);
                    for (i, b) in frame[4..].iter().enumerate() {
                        let page = base & !0xFF;
                        let at = page + ((base + i) & 0xFF);
                        self.mem[at] &= b;
                    }
                    self.write_enabled = false;
                }
                cmd::SECTOR_ERASE if self.write_enabled => {
                    let base = Self::addr(&frame);
                    self.mem[base..base + 0x1000].fill(0xFF);
                    self.write_enabled = false;
                }
                _ => {}
            }
            self.log.push(frame);
        }
    }

    impl ErrorType for FakeFlash {
        type Error = Infallible;
    }

    impl SpiDevice<u8> for FakeFlash {
        fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            let mut mosi = Vec::new();
            for op in ops.iter_mut() {
                match op {
                    Operation::Write(w) => mosi.extend_from_slice(w),
                    Operation::Read(r) => {
                        for b in r.iter_mut() {
                            mosi.push(0);
                            *b = self.respond(&mosi, mosi.len() - 1);
                        }
                    }
                    Operation::TransferInPlace(buf) => {
                        for b in buf.iter_mut() {
                            mosi.push(*b);
                            *b = if mosi.len() == 1 { 0 } else { self.respond(&mosi, mosi.len() - 1) };
                        }
                    }
                    Operation::Transfer(_, _) | Operation::DelayNs(_) => unimplemented!(),
                }
            }
            self.finish(mosi);
            Ok(())
        }
    }

    #[test]
    fn identification_commands() {
        let mut flash = SpiFlash::new(FakeFlash::new());

        let jedec = flash.jedec_id().unwrap();
        assert_eq!(jedec.manufacturer, MANUFACTURER_GIGADEVICE);
        assert_eq!(jedec.size(), Some(CAPACITY));
        assert_eq!(flash.device_id().unwrap(), 0x17);
        assert_eq!(flash.manufacturer_device_id().unwrap(), (0xC8, 0x17));

        let log = &flash.free().log;
        assert_eq!(log[1], [cmd::DEVICE_ID, 0, 0, 0, 0]);
        assert_eq!(log[2], [cmd::MANUFACTURER_ID, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn erase_is_aligned_and_write_enabled() {
        let mut flash = SpiFlash::new(FakeFlash::new());

        flash.sector_erase(0x1234).unwrap();

        let log = &flash.free().log;
        assert_eq!(log[0], [cmd::WRITE_ENABLE]);
        assert_eq!(log[1], [cmd::SECTOR_ERASE, 0x00, 0x10, 0x00]);
        assert_eq!(log[2], [cmd::READ_STATUS_REG_1, 0]);
    }

    #[test]
    fn write_splits_on_page_boundaries() {
        let mut flash = SpiFlash::new(FakeFlash::new());
        let data: Vec<u8> = (0..300u32).map(|i| (i + 10) as u8).collect();

        flash.write(0x10F0, &data).unwrap();

        let mut back = vec![0u8; 300];
        flash.read(ReadMode::Fast, 0x10F0, &mut back).unwrap();
        assert_eq!(back, data);

        let programs: Vec<usize> = flash
            .free()
            .log
            .iter()
            .filter(|f| f[0] == cmd::PAGE_PROGRAM)
            .map(|f| f.len() - 4)
            .collect();
        assert_eq!(programs, [16, 256, 28]);
    }

    #[test]
    fn erase_after_program_reads_back_blank() {
        let mut flash = SpiFlash::new(FakeFlash::new());

        flash.page_program(0x1000, &[0x00; 100]).unwrap();
        flash.sector_erase(0x1000).unwrap();

        let mut back = [0u8; 105];
        flash.read(ReadMode::Normal, 0x1000, &mut back).unwrap();
        assert!(back.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn wait_ready_polls_until_wip_clears() {
        let mut fake = FakeFlash::new();
        fake.status = vec![SR1_WIP, SR1_WIP, 0];
        let mut flash = SpiFlash::new(fake);

        flash.write_status(0x1C).unwrap();

        let log = &flash.free().log;
        assert_eq!(log[1], [cmd::WRITE_STATUS_REG_1, 0x1C]);
        assert_eq!(log.iter().filter(|f| f[0] == cmd::READ_STATUS_REG_1).count(), 3);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut flash = SpiFlash::new(FakeFlash::new());
        let mut buf = [0u8; 2];

        assert_eq!(flash.read(ReadMode::Normal, CAPACITY - 1, &mut buf), Err(Error::OutOfBounds));
        assert_eq!(flash.sector_erase(CAPACITY), Err(Error::OutOfBounds));
        assert!(flash.free().log.is_empty());
    }
}
