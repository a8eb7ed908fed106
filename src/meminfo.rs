//! RAM topology: enumeration of installed memory modules.
//!
//! # Scope
//! Reads the SMBIOS table through the Linux sysfs DMI export and decodes
//! Memory Device (type 17) structures into [`RamModule`] records: slot
//! label, manufacturer, part number, capacity, DDR generation, rated and
//! configured speeds. Purely informational; no value here feeds the
//! measurement path.
//!
//! # Failure modes
//! Everything degrades gracefully. A missing or unreadable table yields
//! [`PlatformInfoError`], which callers render as "not available". Fields
//! absent from a structure fall back to the [`RamModule::default`]
//! placeholders. Values are passed through as the firmware reports them;
//! vendors routinely pad strings or report zeros and this module does not
//! second-guess them.

use std::fmt;
use std::io;

const DMI_TABLE_PATH: &str = "/sys/firmware/dmi/tables/DMI";

const STRUCT_MEMORY_DEVICE: u8 = 17;
const STRUCT_END_OF_TABLE: u8 = 127;

/// One populated memory slot, as reported by the firmware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RamModule {
    /// Slot label, e.g. "DIMM_A1".
    pub slot: String,
    pub manufacturer: String,
    /// Part number.
    pub model: String,
    pub capacity_bytes: u64,
    /// DDR generation (1..=5), 0 when the type code is unrecognized.
    pub ddr_generation: u32,
    /// Rated speed in MT/s, 0 when unreported.
    pub rated_speed_mts: u32,
    /// Configured (actual) clock in MT/s, 0 when unreported.
    pub configured_clock_mts: u32,
}

impl Default for RamModule {
    fn default() -> Self {
        Self {
            slot: "<unknown slot>".to_string(),
            manufacturer: "<unknown manufacturer>".to_string(),
            model: "<unknown model>".to_string(),
            capacity_bytes: 0,
            ddr_generation: 0,
            rated_speed_mts: 0,
            configured_clock_mts: 0,
        }
    }
}

/// Errors from platform-information queries.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformInfoError {
    /// No SMBIOS source on this platform.
    Unsupported,
    /// The table export exists but could not be read.
    Io(io::Error),
    /// The table data ended mid-structure.
    Truncated,
}

impl fmt::Display for PlatformInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "platform memory information is not available here"),
            Self::Io(err) => write!(f, "failed to read the SMBIOS table: {err}"),
            Self::Truncated => write!(f, "SMBIOS table data is truncated"),
        }
    }
}

impl std::error::Error for PlatformInfoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PlatformInfoError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Enumerates populated memory slots from the firmware tables.
///
/// # Errors
/// `Unsupported` on non-Linux platforms, `Io` when the sysfs export cannot
/// be read (typically a permissions issue), `Truncated` on malformed data.
#[cfg(target_os = "linux")]
pub fn query_memory_modules() -> Result<Vec<RamModule>, PlatformInfoError> {
    let table = std::fs::read(DMI_TABLE_PATH)?;
    parse_dmi_table(&table)
}

#[cfg(not(target_os = "linux"))]
pub fn query_memory_modules() -> Result<Vec<RamModule>, PlatformInfoError> {
    Err(PlatformInfoError::Unsupported)
}

/// Decodes raw SMBIOS structure data into memory-module records.
///
/// Each structure is a 4-byte header (type, formatted length, 16-bit
/// handle), a formatted area, and a string-set terminated by a double NUL.
/// Empty slots (Size == 0) are skipped; a type-127 structure ends the walk.
pub fn parse_dmi_table(data: &[u8]) -> Result<Vec<RamModule>, PlatformInfoError> {
    let mut modules = Vec::new();
    let mut pos = 0usize;

    while pos + 4 <= data.len() {
        let struct_type = data[pos];
        let formatted_len = data[pos + 1] as usize;
        if struct_type == STRUCT_END_OF_TABLE {
            break;
        }
        if formatted_len < 4 || pos + formatted_len > data.len() {
            return Err(PlatformInfoError::Truncated);
        }
        let formatted = &data[pos..pos + formatted_len];

        // The string-set runs until a double NUL. A structure with no
        // strings still carries the two terminator bytes.
        let strings_start = pos + formatted_len;
        let strings_end = find_double_nul(data, strings_start).ok_or(PlatformInfoError::Truncated)?;
        let strings = &data[strings_start..strings_end];

        if struct_type == STRUCT_MEMORY_DEVICE {
            if let Some(module) = decode_memory_device(formatted, strings) {
                modules.push(module);
            }
        }

        pos = strings_end + 2;
    }

    Ok(modules)
}

/// Index of the first byte of the `\0\0` terminator at or after `start`.
fn find_double_nul(data: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn read_u16(formatted: &[u8], offset: usize) -> Option<u16> {
    let bytes = formatted.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(formatted: &[u8], offset: usize) -> Option<u32> {
    let bytes = formatted.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Resolves a 1-based SMBIOS string reference. 0 means "no string".
fn read_string(formatted: &[u8], offset: usize, strings: &[u8]) -> Option<String> {
    let index = *formatted.get(offset)? as usize;
    if index == 0 {
        return None;
    }
    let raw = strings.split(|&b| b == 0).nth(index - 1)?;
    let text = String::from_utf8_lossy(raw).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Capacity in bytes from the Size field (offset 0x0C).
///
/// 0x7FFF redirects to the 32-bit Extended Size at 0x1C (always MiB);
/// otherwise bit 15 selects KiB units, cleared means MiB. 0 is an empty
/// slot, 0xFFFF is "unknown"; both yield `None`.
fn device_capacity(formatted: &[u8]) -> Option<u64> {
    let size = read_u16(formatted, 0x0C)?;
    match size {
        0 | 0xFFFF => None,
        0x7FFF => {
            let mib = read_u32(formatted, 0x1C)? & 0x7FFF_FFFF;
            Some(u64::from(mib) * 1024 * 1024)
        }
        _ => {
            if size & 0x8000 != 0 {
                Some(u64::from(size & 0x7FFF) * 1024)
            } else {
                Some(u64::from(size) * 1024 * 1024)
            }
        }
    }
}

/// Maps the SMBIOS Memory Type code to a DDR generation, 0 if not DDR.
fn ddr_generation(type_code: u8) -> u32 {
    match type_code {
        20 => 1,
        21 => 2,
        24 => 3,
        26 => 4,
        27 | 34 => 5,
        _ => 0,
    }
}

/// Decodes one Memory Device structure, `None` for an empty slot.
fn decode_memory_device(formatted: &[u8], strings: &[u8]) -> Option<RamModule> {
    let capacity_bytes = device_capacity(formatted)?;

    let mut module = RamModule {
        capacity_bytes,
        ..RamModule::default()
    };
    if let Some(slot) = read_string(formatted, 0x10, strings) {
        module.slot = slot;
    }
    if let Some(type_code) = formatted.get(0x12) {
        module.ddr_generation = ddr_generation(*type_code);
    }
    if let Some(speed) = read_u16(formatted, 0x15) {
        module.rated_speed_mts = u32::from(speed);
    }
    if let Some(manufacturer) = read_string(formatted, 0x17, strings) {
        module.manufacturer = manufacturer;
    }
    if let Some(model) = read_string(formatted, 0x1A, strings) {
        module.model = model;
    }
    if let Some(clock) = read_u16(formatted, 0x20) {
        module.configured_clock_mts = u32::from(clock);
    }
    Some(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds one SMBIOS structure: header + formatted tail + strings.
    fn structure(struct_type: u8, tail: &[u8], strings: &[&str]) -> Vec<u8> {
        let formatted_len = 4 + tail.len();
        let mut out = vec![struct_type, formatted_len as u8, 0, 0];
        out.extend_from_slice(tail);
        if strings.is_empty() {
            out.extend_from_slice(&[0, 0]);
        } else {
            for s in strings {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            out.push(0);
        }
        out
    }

    /// A type-17 formatted tail out to offset 0x21 (inclusive), with the
    /// interesting fields poked in.
    fn memory_device_tail(
        size: u16,
        locator_str: u8,
        type_code: u8,
        speed: u16,
        manufacturer_str: u8,
        part_str: u8,
        configured: u16,
    ) -> Vec<u8> {
        let mut tail = vec![0u8; 0x22 - 4];
        let put_u16 = |tail: &mut Vec<u8>, off: usize, v: u16| {
            tail[off - 4..off - 2].copy_from_slice(&v.to_le_bytes());
        };
        put_u16(&mut tail, 0x0C, size);
        tail[0x10 - 4] = locator_str;
        tail[0x12 - 4] = type_code;
        put_u16(&mut tail, 0x15, speed);
        tail[0x17 - 4] = manufacturer_str;
        tail[0x1A - 4] = part_str;
        put_u16(&mut tail, 0x20, configured);
        tail
    }

    #[test]
    fn decodes_a_populated_ddr4_module() {
        let tail = memory_device_tail(16384, 1, 26, 3200, 2, 3, 2933);
        let table = structure(17, &tail, &["DIMM_A1", "Kingston", "KHX3200C16D4 "]);

        let modules = parse_dmi_table(&table).unwrap();
        assert_eq!(modules.len(), 1);
        let m = &modules[0];
        assert_eq!(m.slot, "DIMM_A1");
        assert_eq!(m.manufacturer, "Kingston");
        assert_eq!(m.model, "KHX3200C16D4");
        assert_eq!(m.capacity_bytes, 16384 * 1024 * 1024);
        assert_eq!(m.ddr_generation, 4);
        assert_eq!(m.rated_speed_mts, 3200);
        assert_eq!(m.configured_clock_mts, 2933);
    }

    #[test]
    fn skips_empty_slots() {
        let empty = structure(17, &memory_device_tail(0, 1, 26, 0, 0, 0, 0), &["DIMM_B1"]);
        let full = structure(17, &memory_device_tail(8192, 1, 24, 1600, 0, 0, 1600), &["DIMM_A1"]);
        let mut table = empty;
        table.extend_from_slice(&full);

        let modules = parse_dmi_table(&table).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].slot, "DIMM_A1");
        assert_eq!(modules[0].ddr_generation, 3);
    }

    #[test]
    fn ignores_other_structure_types() {
        let bios = structure(0, &[1, 2], &["Vendor"]);
        let device = structure(17, &memory_device_tail(4096, 0, 27, 4800, 0, 0, 4800), &[]);
        let mut table = bios;
        table.extend_from_slice(&device);

        let modules = parse_dmi_table(&table).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].slot, "<unknown slot>");
        assert_eq!(modules[0].ddr_generation, 5);
    }

    #[test]
    fn stops_at_the_end_of_table_marker() {
        let end = structure(127, &[], &[]);
        let device = structure(17, &memory_device_tail(4096, 0, 26, 0, 0, 0, 0), &[]);
        let mut table = end;
        table.extend_from_slice(&device);

        let modules = parse_dmi_table(&table).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn kib_units_and_extended_size() {
        // Bit 15 set: size in KiB.
        let kib = structure(17, &memory_device_tail(0x8000 | 512, 0, 26, 0, 0, 0, 0), &[]);
        let modules = parse_dmi_table(&kib).unwrap();
        assert_eq!(modules[0].capacity_bytes, 512 * 1024);

        // 0x7FFF: capacity lives in the Extended Size field (MiB).
        let mut tail = memory_device_tail(0x7FFF, 0, 26, 0, 0, 0, 0);
        tail[0x1C - 4..0x20 - 4].copy_from_slice(&32768u32.to_le_bytes());
        let ext = structure(17, &tail, &[]);
        let modules = parse_dmi_table(&ext).unwrap();
        assert_eq!(modules[0].capacity_bytes, 32768u64 * 1024 * 1024);
    }

    #[test]
    fn short_structures_fall_back_to_defaults() {
        // Formatted area ends right after the Size field; every later
        // field is simply absent.
        let mut tail = vec![0u8; 0x0E - 4];
        tail[0x0C - 4..0x0E - 4].copy_from_slice(&2048u16.to_le_bytes());
        let table = structure(17, &tail, &[]);

        let modules = parse_dmi_table(&table).unwrap();
        assert_eq!(modules.len(), 1);
        let m = &modules[0];
        assert_eq!(m.capacity_bytes, 2048 * 1024 * 1024);
        assert_eq!(m.slot, "<unknown slot>");
        assert_eq!(m.manufacturer, "<unknown manufacturer>");
        assert_eq!(m.ddr_generation, 0);
    }

    #[test]
    fn dangling_string_reference_keeps_the_default() {
        // Locator references string 3 but only one string exists.
        let tail = memory_device_tail(1024, 3, 26, 0, 0, 0, 0);
        let table = structure(17, &tail, &["only"]);
        let modules = parse_dmi_table(&table).unwrap();
        assert_eq!(modules[0].slot, "<unknown slot>");
    }

    #[test]
    fn truncated_table_is_an_error() {
        // Header claims 0x22 formatted bytes but the data stops short.
        let table = vec![17u8, 0x22, 0, 0, 1, 2, 3];
        assert!(matches!(
            parse_dmi_table(&table),
            Err(PlatformInfoError::Truncated)
        ));

        // Missing the double-NUL terminator after the formatted area.
        let mut unterminated = structure(17, &memory_device_tail(1024, 0, 26, 0, 0, 0, 0), &[]);
        unterminated.truncate(unterminated.len() - 2);
        unterminated.push(b'x');
        assert!(matches!(
            parse_dmi_table(&unterminated),
            Err(PlatformInfoError::Truncated)
        ));
    }

    #[test]
    fn empty_table_yields_no_modules() {
        assert!(parse_dmi_table(&[]).unwrap().is_empty());
    }
}
