//! Persisted display configuration (the `baseparameter` partition)
//!
//! The partition holds two [`DisplayInfo`] sub-records: `main` at offset 0
//! and `aux` at [`BASE_OFFSET`]. Each sub-record is encoded explicitly,
//! little-endian, field by field (layout version 1):
//!
//! ```text
//! offset  size  field
//!      0   280  screen_list: 5 x ScreenInfo (56 bytes each)
//!                 type u32, clock/hdisplay/hsync_start/hsync_end/htotal/
//!                 vdisplay/vsync_start/vsync_end/vtotal u32 x 9, flags u32,
//!                 format u32, depthc u32, feature u32
//!    280     8  scan: left, top, right, bottom u16
//!    288   132  hwc_info: device [u8; 128], fps f32 (opaque)
//!    420    16  bcsh: brightness, contrast, saturation, hue u32
//!    436   512  reserved (opaque)
//!    948  6146  mlutdata: size u16, red/green/blue [u16; 1024]
//! ```
//!
//! Opaque areas are carried through untouched so a decode/encode cycle
//! reproduces the partition byte for byte.

use crate::mode::{refresh_rate, ModeSpec};
use crate::properties::DisplayType;
use crate::resources::ConnectorType;
use crate::{Error, Result};
use bitflags::bitflags;
use serde::Serialize;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LAYOUT_VERSION: u32 = 1;

/// Byte offset of the `aux` sub-record
pub const BASE_OFFSET: u64 = 8 * 1024;
/// Screen slots per sub-record
pub const SCREEN_SLOTS: usize = 5;
/// Maximum gamma LUT entries per channel
pub const LUT_MAX_ENTRIES: usize = 1024;

const SCREEN_INFO_LEN: usize = 56;
const HWC_DEVICE_LEN: usize = 128;
const RESERVED_LEN: usize = 512;
const LUT_DATA_LEN: usize = 2 + 3 * 2 * LUT_MAX_ENTRIES;

/// Encoded size of one sub-record
pub const DISPLAY_INFO_LEN: usize =
    SCREEN_SLOTS * SCREEN_INFO_LEN + 8 + HWC_DEVICE_LEN + 4 + 16 + RESERVED_LEN + LUT_DATA_LEN;
/// Minimum partition size holding both sub-records
pub const RECORD_LEN: u64 = BASE_OFFSET + DISPLAY_INFO_LEN as u64;

bitflags! {
    /// Per-slot feature bits
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
    pub struct Feature: u32 {
        const RESOLUTION_AUTO = 1 << 0;
        const COLOR_AUTO = 1 << 1;
        const HDCP1X_EN = 1 << 2;
        const RESOLUTION_WHITE_EN = 1 << 3;
    }
}

/// Output color format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum OutputFormat {
    #[default]
    Rgb,
    YCbCr444,
    YCbCr422,
    YCbCr420,
    /// Driver picks the best subsampling
    YCbCrHighSubsampling,
    YCbCrLowSubsampling,
    Unknown(u32),
}

impl OutputFormat {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Rgb,
            1 => Self::YCbCr444,
            2 => Self::YCbCr422,
            3 => Self::YCbCr420,
            4 => Self::YCbCrHighSubsampling,
            5 => Self::YCbCrLowSubsampling,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Rgb => 0,
            Self::YCbCr444 => 1,
            Self::YCbCr422 => 2,
            Self::YCbCr420 => 3,
            Self::YCbCrHighSubsampling => 4,
            Self::YCbCrLowSubsampling => 5,
            Self::Unknown(other) => other,
        }
    }

    /// Color-mode property token
    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::Rgb => Some("RGB"),
            Self::YCbCr444 => Some("YCBCR444"),
            Self::YCbCr422 => Some("YCBCR422"),
            Self::YCbCr420 => Some("YCBCR420"),
            _ => None,
        }
    }
}

/// Output color depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ColorDepth {
    #[default]
    Automatic,
    Depth24,
    Depth30,
    Unknown(u32),
}

impl ColorDepth {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Automatic,
            8 => Self::Depth24,
            10 => Self::Depth30,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Automatic => 0,
            Self::Depth24 => 8,
            Self::Depth30 => 10,
            Self::Unknown(other) => other,
        }
    }

    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::Depth24 => Some("8bit"),
            Self::Depth30 => Some("10bit"),
            _ => None,
        }
    }
}

/// Saved display timing, all zero when the resolution is automatic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub clock: u32,
    pub hdisplay: u32,
    pub hsync_start: u32,
    pub hsync_end: u32,
    pub htotal: u32,
    pub vdisplay: u32,
    pub vsync_start: u32,
    pub vsync_end: u32,
    pub vtotal: u32,
    pub flags: u32,
}

impl Resolution {
    /// A usable mode needs a size and a pixel clock
    pub fn is_set(&self) -> bool {
        self.hdisplay != 0 && self.vdisplay != 0 && self.clock != 0
    }

    /// The saved timing in property-string form, refresh derived from the clock
    pub fn to_spec(&self) -> ModeSpec {
        ModeSpec {
            hdisplay: self.hdisplay,
            vdisplay: self.vdisplay,
            refresh: refresh_rate(self.clock, self.htotal, self.vtotal, self.flags),
            hsync_start: self.hsync_start,
            hsync_end: self.hsync_end,
            htotal: self.htotal,
            vsync_start: self.vsync_start,
            vsync_end: self.vsync_end,
            vtotal: self.vtotal,
            flags: self.flags,
        }
    }
}

/// One connector type's saved output settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScreenInfo {
    /// Connector type owning this slot, 0 when unused
    pub connector_type: ConnectorType,
    pub resolution: Resolution,
    pub format: OutputFormat,
    pub depthc: ColorDepth,
    pub feature: Feature,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bcsh {
    pub brightness: u32,
    pub contrast: u32,
    pub saturation: u32,
    pub hue: u32,
}

/// Overscan percentages per edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overscan {
    pub left: u16,
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
}

impl Overscan {
    pub fn uniform(value: u16) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Composer bring-up info, only written by debug builds of the composer
#[derive(Debug, Clone, PartialEq)]
pub struct HwcInfo {
    pub device: [u8; HWC_DEVICE_LEN],
    pub fps_bits: u32,
}

impl Default for HwcInfo {
    fn default() -> Self {
        Self {
            device: [0; HWC_DEVICE_LEN],
            fps_bits: 0,
        }
    }
}

/// Saved gamma table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LutData {
    pub size: u16,
    #[serde(skip)]
    pub red: Vec<u16>,
    #[serde(skip)]
    pub green: Vec<u16>,
    #[serde(skip)]
    pub blue: Vec<u16>,
}

impl Default for LutData {
    fn default() -> Self {
        Self {
            size: 0,
            red: vec![0; LUT_MAX_ENTRIES],
            green: vec![0; LUT_MAX_ENTRIES],
            blue: vec![0; LUT_MAX_ENTRIES],
        }
    }
}

impl LutData {
    /// Overwrite the first `lut.len()` entries of each channel
    pub fn store(&mut self, lut: &GammaLut) {
        let n = lut.len();
        for channel in [&mut self.red, &mut self.green, &mut self.blue] {
            channel.resize(LUT_MAX_ENTRIES, 0);
        }
        self.size = n as u16;
        self.red[..n].copy_from_slice(&lut.red);
        self.green[..n].copy_from_slice(&lut.green);
        self.blue[..n].copy_from_slice(&lut.blue);
    }
}

/// A gamma LUT handed in by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaLut {
    red: Vec<u16>,
    green: Vec<u16>,
    blue: Vec<u16>,
}

impl GammaLut {
    pub fn new(red: Vec<u16>, green: Vec<u16>, blue: Vec<u16>) -> Result<Self> {
        if red.len() != green.len() || red.len() != blue.len() {
            return Err(Error::Gamma(format!(
                "channel lengths differ: {}/{}/{}",
                red.len(),
                green.len(),
                blue.len()
            )));
        }
        if red.is_empty() || red.len() > LUT_MAX_ENTRIES {
            return Err(Error::Gamma(format!(
                "{} entries, expected 1..={}",
                red.len(),
                LUT_MAX_ENTRIES
            )));
        }
        Ok(Self { red, green, blue })
    }

    pub fn len(&self) -> usize {
        self.red.len()
    }

    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }

    pub fn red(&self) -> &[u16] {
        &self.red
    }

    pub fn green(&self) -> &[u16] {
        &self.green
    }

    pub fn blue(&self) -> &[u16] {
        &self.blue
    }
}

/// One display's persisted configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayInfo {
    pub screen_list: [ScreenInfo; SCREEN_SLOTS],
    pub scan: Overscan,
    #[serde(skip)]
    pub hwc_info: HwcInfo,
    pub bcsh: Bcsh,
    #[serde(skip)]
    pub reserved: Vec<u8>,
    pub mlutdata: LutData,
}

impl Default for DisplayInfo {
    fn default() -> Self {
        Self {
            screen_list: [ScreenInfo::default(); SCREEN_SLOTS],
            scan: Overscan::default(),
            hwc_info: HwcInfo::default(),
            bcsh: Bcsh::default(),
            reserved: vec![0; RESERVED_LEN],
            mlutdata: LutData::default(),
        }
    }
}

impl DisplayInfo {
    /// Slot holding `connector_type`, or slot 0 when none does
    ///
    /// Slot 0 is then overwritten by the caller, whatever type it held.
    pub fn find_slot(&self, connector_type: ConnectorType) -> usize {
        match self
            .screen_list
            .iter()
            .position(|s| s.connector_type.0 != 0 && s.connector_type == connector_type)
        {
            Some(slot) => {
                debug!("find_slot: {} type={}", slot, connector_type);
                slot
            }
            None => {
                debug!("Nothing saved for type {}, using the first slot", connector_type);
                0
            }
        }
    }

    /// Slot for `connector_type` if one was saved for it
    pub fn saved_slot(&self, connector_type: ConnectorType) -> &ScreenInfo {
        &self.screen_list[self.find_slot(connector_type)]
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < DISPLAY_INFO_LEN {
            return Err(Error::RecordTooShort {
                len: buf.len() as u64,
                need: DISPLAY_INFO_LEN as u64,
            });
        }
        let mut r = Reader::new(&buf[..DISPLAY_INFO_LEN]);

        let mut screen_list = [ScreenInfo::default(); SCREEN_SLOTS];
        for slot in screen_list.iter_mut() {
            slot.connector_type = ConnectorType(r.u32());
            slot.resolution = Resolution {
                clock: r.u32(),
                hdisplay: r.u32(),
                hsync_start: r.u32(),
                hsync_end: r.u32(),
                htotal: r.u32(),
                vdisplay: r.u32(),
                vsync_start: r.u32(),
                vsync_end: r.u32(),
                vtotal: r.u32(),
                flags: r.u32(),
            };
            slot.format = OutputFormat::from_raw(r.u32());
            slot.depthc = ColorDepth::from_raw(r.u32());
            slot.feature = Feature::from_bits_retain(r.u32());
        }

        let scan = Overscan {
            left: r.u16(),
            top: r.u16(),
            right: r.u16(),
            bottom: r.u16(),
        };

        let mut hwc_info = HwcInfo::default();
        hwc_info.device.copy_from_slice(r.bytes(HWC_DEVICE_LEN));
        hwc_info.fps_bits = r.u32();

        let bcsh = Bcsh {
            brightness: r.u32(),
            contrast: r.u32(),
            saturation: r.u32(),
            hue: r.u32(),
        };

        let reserved = r.bytes(RESERVED_LEN).to_vec();

        let size = r.u16();
        let red = r.u16s(LUT_MAX_ENTRIES);
        let green = r.u16s(LUT_MAX_ENTRIES);
        let blue = r.u16s(LUT_MAX_ENTRIES);

        Ok(Self {
            screen_list,
            scan,
            hwc_info,
            bcsh,
            reserved,
            mlutdata: LutData {
                size,
                red,
                green,
                blue,
            },
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(DISPLAY_INFO_LEN);

        for slot in &self.screen_list {
            let res = &slot.resolution;
            w.u32(slot.connector_type.0);
            for v in [
                res.clock,
                res.hdisplay,
                res.hsync_start,
                res.hsync_end,
                res.htotal,
                res.vdisplay,
                res.vsync_start,
                res.vsync_end,
                res.vtotal,
                res.flags,
            ] {
                w.u32(v);
            }
            w.u32(slot.format.raw());
            w.u32(slot.depthc.raw());
            w.u32(slot.feature.bits());
        }

        for v in [self.scan.left, self.scan.top, self.scan.right, self.scan.bottom] {
            w.u16(v);
        }

        w.bytes(&self.hwc_info.device, HWC_DEVICE_LEN);
        w.u32(self.hwc_info.fps_bits);

        for v in [
            self.bcsh.brightness,
            self.bcsh.contrast,
            self.bcsh.saturation,
            self.bcsh.hue,
        ] {
            w.u32(v);
        }

        w.bytes(&self.reserved, RESERVED_LEN);

        w.u16(self.mlutdata.size);
        w.u16s(&self.mlutdata.red, LUT_MAX_ENTRIES);
        w.u16s(&self.mlutdata.green, LUT_MAX_ENTRIES);
        w.u16s(&self.mlutdata.blue, LUT_MAX_ENTRIES);

        w.finish()
    }
}

/// Both sub-records of the partition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BaseParameter {
    pub main: DisplayInfo,
    pub aux: DisplayInfo,
}

impl BaseParameter {
    pub fn display(&self, display: DisplayType) -> &DisplayInfo {
        match display {
            DisplayType::Primary => &self.main,
            DisplayType::External => &self.aux,
        }
    }

    pub fn display_mut(&mut self, display: DisplayType) -> &mut DisplayInfo {
        match display {
            DisplayType::Primary => &mut self.main,
            DisplayType::External => &mut self.aux,
        }
    }

    /// Decode a whole partition image
    pub fn decode(image: &[u8]) -> Result<Self> {
        if (image.len() as u64) < RECORD_LEN {
            return Err(Error::RecordTooShort {
                len: image.len() as u64,
                need: RECORD_LEN,
            });
        }
        let aux = BASE_OFFSET as usize;
        Ok(Self {
            main: DisplayInfo::decode(&image[..DISPLAY_INFO_LEN])?,
            aux: DisplayInfo::decode(&image[aux..aux + DISPLAY_INFO_LEN])?,
        })
    }
}

/// The block device (or image file) holding the baseparameter record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingStore {
    path: PathBuf,
}

/// `access(path, R_OK | W_OK) == 0`
fn is_read_writable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

/// Flush all filesystem buffers
pub(crate) fn sync_all_filesystems() {
    unsafe { libc::sync() };
}

impl BackingStore {
    /// First candidate that exists and is readable and writable
    pub fn locate<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        for (i, candidate) in candidates.iter().enumerate() {
            let path = candidate.as_ref();
            if is_read_writable(path) {
                return Ok(Self {
                    path: path.to_path_buf(),
                });
            }
            debug!(
                "baseparameter candidate[{}]={} not usable: {}",
                i,
                path.display(),
                std::io::Error::last_os_error()
            );
        }
        Err(Error::BackingStoreUnavailable)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<(File, u64)> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        if len < RECORD_LEN {
            return Err(Error::RecordTooShort {
                len,
                need: RECORD_LEN,
            });
        }
        Ok((file, len))
    }

    /// Read `main` from offset 0 and `aux` from [`BASE_OFFSET`]
    pub fn read(&self) -> Result<BaseParameter> {
        let (mut file, len) = self.open()?;
        debug!("Reading baseparameter from {} ({} bytes)", self.path.display(), len);

        let mut buf = vec![0u8; DISPLAY_INFO_LEN];
        file.read_exact(&mut buf)?;
        let main = DisplayInfo::decode(&buf)?;

        file.seek(SeekFrom::Start(BASE_OFFSET))?;
        file.read_exact(&mut buf)?;
        let aux = DisplayInfo::decode(&buf)?;

        Ok(BaseParameter { main, aux })
    }

    /// Write `main` then `aux`, then sync
    ///
    /// The partition must already be full-size; a short image is refused
    /// rather than extended.
    pub fn write(&self, record: &BaseParameter) -> Result<()> {
        let result = self.write_inner(record);
        sync_all_filesystems();
        if let Err(e) = &result {
            warn!("Failed to write baseparameter {}: {}", self.path.display(), e);
        }
        result
    }

    fn write_inner(&self, record: &BaseParameter) -> Result<()> {
        let (mut file, _) = self.open()?;
        file.write_all(&record.main.encode())?;
        file.seek(SeekFrom::Start(BASE_OFFSET))?;
        file.write_all(&record.aux.encode())?;
        file.sync_all()?;
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn u16(&mut self) -> u16 {
        let b = self.bytes(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn u32(&mut self) -> u32 {
        let b = self.bytes(4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn u16s(&mut self, n: usize) -> Vec<u16> {
        (0..n).map(|_| self.u16()).collect()
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Exactly `n` bytes: truncated or zero-padded
    fn bytes(&mut self, v: &[u8], n: usize) {
        let take = v.len().min(n);
        self.buf.extend_from_slice(&v[..take]);
        self.buf.resize(self.buf.len() + (n - take), 0);
    }

    fn u16s(&mut self, v: &[u16], n: usize) {
        for i in 0..n {
            self.u16(v.get(i).copied().unwrap_or(0));
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
pub(crate) fn blank_image(len: u64) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    file.as_file().set_len(len).unwrap();
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_fits_in_base_offset() {
        assert_eq!(DISPLAY_INFO_LEN, 7094);
        assert!((DISPLAY_INFO_LEN as u64) <= BASE_OFFSET);
        assert_eq!(DisplayInfo::default().encode().len(), DISPLAY_INFO_LEN);
    }

    #[test]
    fn test_decode_preserves_every_byte() {
        let raw: Vec<u8> = (0..DISPLAY_INFO_LEN).map(|i| (i * 7 % 251) as u8).collect();
        let info = DisplayInfo::decode(&raw).unwrap();
        assert_eq!(info.encode(), raw);
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = DisplayInfo::decode(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, Error::RecordTooShort { len: 100, .. }));
    }

    #[test]
    fn test_find_slot_exact_match() {
        let mut info = DisplayInfo::default();
        info.screen_list[2].connector_type = ConnectorType::HDMIA;
        info.screen_list[4].connector_type = ConnectorType::TV;

        assert_eq!(info.find_slot(ConnectorType::HDMIA), 2);
        assert_eq!(info.find_slot(ConnectorType::TV), 4);
        // Idempotent without intervening writes
        assert_eq!(info.find_slot(ConnectorType::TV), 4);
    }

    #[test]
    fn test_find_slot_falls_back_to_first() {
        let mut info = DisplayInfo::default();
        info.screen_list[0].connector_type = ConnectorType::TV;
        assert_eq!(info.find_slot(ConnectorType::HDMIA), 0);
        assert_eq!(DisplayInfo::default().find_slot(ConnectorType::DSI), 0);
    }

    #[test]
    fn test_gamma_lut_validation() {
        assert!(GammaLut::new(vec![0; 4], vec![0; 4], vec![0; 3]).is_err());
        assert!(GammaLut::new(vec![], vec![], vec![]).is_err());
        assert!(GammaLut::new(vec![0; 1025], vec![0; 1025], vec![0; 1025]).is_err());

        let lut = GammaLut::new(vec![1, 2], vec![3, 4], vec![5, 6]).unwrap();
        let mut data = LutData::default();
        data.store(&lut);
        assert_eq!(data.size, 2);
        assert_eq!(&data.green[..3], &[3, 4, 0]);
    }

    #[test]
    fn test_locate_skips_missing_candidates() {
        let image = blank_image(RECORD_LEN);
        let candidates = [PathBuf::from("/nonexistent/baseparameter"), image.path().to_path_buf()];
        let store = BackingStore::locate(&candidates).unwrap();
        assert_eq!(store.path(), image.path());

        let missing = [PathBuf::from("/nonexistent/baseparameter")];
        assert!(matches!(
            BackingStore::locate(&missing),
            Err(Error::BackingStoreUnavailable)
        ));
    }

    #[test]
    fn test_read_rejects_short_image() {
        let image = blank_image(RECORD_LEN - 1);
        let store = BackingStore::locate(&[image.path()]).unwrap();
        assert!(matches!(store.read(), Err(Error::RecordTooShort { .. })));
        assert!(store.write(&BaseParameter::default()).is_err());
        assert_eq!(image.as_file().metadata().unwrap().len(), RECORD_LEN - 1);
    }

    #[test]
    fn test_write_then_read_back() {
        let image = blank_image(RECORD_LEN + 512);
        let store = BackingStore::locate(&[image.path()]).unwrap();

        let mut record = BaseParameter::default();
        record.main.screen_list[1].connector_type = ConnectorType::HDMIA;
        record.main.screen_list[1].format = OutputFormat::YCbCr420;
        record.main.screen_list[1].depthc = ColorDepth::Depth30;
        record.main.bcsh.brightness = 61;
        record.aux.scan = Overscan::uniform(95);
        record.aux.screen_list[0].feature = Feature::RESOLUTION_AUTO | Feature::COLOR_AUTO;

        store.write(&record).unwrap();
        let back = store.read().unwrap();
        assert_eq!(back, record);
        assert_eq!(back.main.encode(), record.main.encode());
        assert_eq!(back.aux.encode(), record.aux.encode());

        // Writes never grow or shrink the partition
        assert_eq!(image.as_file().metadata().unwrap().len(), RECORD_LEN + 512);
    }

    #[test]
    fn test_decode_whole_image() {
        let image = blank_image(RECORD_LEN);
        let mut record = BaseParameter::default();
        record.aux.bcsh.hue = 42;
        BackingStore::locate(&[image.path()]).unwrap().write(&record).unwrap();

        let bytes = std::fs::read(image.path()).unwrap();
        assert_eq!(BaseParameter::decode(&bytes).unwrap(), record);
        assert!(matches!(
            BaseParameter::decode(&bytes[..BASE_OFFSET as usize]),
            Err(Error::RecordTooShort { .. })
        ));
    }
}
