//! NEF container format
//!
//! Byte layout, all integers little-endian:
//!
//! ```text
//! magic          4   0x3346454E ("NEF3")
//! compiler      32   UTF-8 name, zero padded or truncated
//! version       16   major, minor, patch, build (u32 each)
//! script hash   20   hash160 of the script
//! checksum       4   first 4 bytes of hash256(header above)
//! script length var  1 byte below 0xFD, else 0xFD+u16 / 0xFE+u32
//! script        ..   at most 1 MiB
//! ```

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::hash::{ScriptHash, checksum};
use crate::{MAX_SCRIPT_LENGTH, NEF_MAGIC};

/// Width of the compiler name field
pub const COMPILER_FIELD_SIZE: usize = 32;

/// Size of the header bytes covered by the checksum
pub const CHECKSUM_COVERED_SIZE: usize = 4 + COMPILER_FIELD_SIZE + 16 + 20;

/// Four-part compiler version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Build number
    pub build: u32,
}

impl Version {
    /// Create a version
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse `major.minor.patch[.build]`
    ///
    /// Each component reads its leading digits, so `"1.2.3"` and
    /// `"1.2.3-beta"` both read as `1.2.3.0`. Missing components and
    /// components without leading digits are zero.
    pub fn parse(text: &str) -> Self {
        let mut parts = [0u32; 4];
        for (slot, component) in parts.iter_mut().zip(text.trim().split('.')) {
            let digits = component
                .find(|c: char| !c.is_ascii_digit())
                .map_or(component, |end| &component[..end]);
            *slot = digits.parse().unwrap_or(0);
        }
        Self::new(parts[0], parts[1], parts[2], parts[3])
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for part in [self.major, self.minor, self.patch, self.build] {
            out.extend_from_slice(&part.to_le_bytes());
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

/// A compiled script wrapped with compiler identity and integrity data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NefFile {
    compiler: String,
    version: Version,
    script_hash: ScriptHash,
    checksum: u32,
    script: Vec<u8>,
}

impl NefFile {
    /// Wrap a script, computing its script hash and checksum
    ///
    /// A compiler name longer than the 32-byte field is truncated at a
    /// character boundary. A script over 1 MiB is rejected.
    pub fn new(script: Vec<u8>, compiler: &str, version: Version) -> Result<Self> {
        if script.len() > MAX_SCRIPT_LENGTH {
            return Err(BytecodeError::ContainerOverflow {
                field: "script",
                len: script.len(),
                max: MAX_SCRIPT_LENGTH,
            });
        }
        let compiler = truncate_name(compiler);
        let script_hash = ScriptHash::of(&script);
        let mut nef = Self {
            compiler,
            version,
            script_hash,
            checksum: 0,
            script,
        };
        nef.checksum = nef.compute_checksum();
        Ok(nef)
    }

    /// Compiler name
    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Compiler version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Content address of the script
    pub fn script_hash(&self) -> ScriptHash {
        self.script_hash
    }

    /// Header checksum
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Script bytes
    pub fn script(&self) -> &[u8] {
        &self.script
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        CHECKSUM_COVERED_SIZE + 4 + var_int_size(self.script.len() as u64) + self.script.len()
    }

    /// Checksum of the header fields that precede the checksum
    pub fn compute_checksum(&self) -> u32 {
        checksum(&self.header_bytes())
    }

    fn header_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CHECKSUM_COVERED_SIZE);
        out.extend_from_slice(&NEF_MAGIC.to_le_bytes());
        let mut name = [0u8; COMPILER_FIELD_SIZE];
        let bytes = self.compiler.as_bytes();
        name[..bytes.len()].copy_from_slice(bytes);
        out.extend_from_slice(&name);
        self.version.write_to(&mut out);
        out.extend_from_slice(self.script_hash.as_bytes());
        out
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        out.reserve(self.size() - out.len());
        out.extend_from_slice(&self.checksum.to_le_bytes());
        write_var_int(&mut out, self.script.len() as u64);
        out.extend_from_slice(&self.script);
        out
    }

    /// Deserialize from bytes, verifying magic, checksum and script hash
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;

        let magic = read_u32_le(bytes, &mut cursor)?;
        if magic != NEF_MAGIC {
            return Err(BytecodeError::InvalidMagic(magic));
        }

        let name = read_bytes(bytes, &mut cursor, COMPILER_FIELD_SIZE)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let compiler = std::str::from_utf8(&name[..end])
            .map_err(|_| BytecodeError::InvalidCompilerName)?
            .to_string();

        let version = Version::new(
            read_u32_le(bytes, &mut cursor)?,
            read_u32_le(bytes, &mut cursor)?,
            read_u32_le(bytes, &mut cursor)?,
            read_u32_le(bytes, &mut cursor)?,
        );

        let mut hash = [0u8; 20];
        hash.copy_from_slice(read_bytes(bytes, &mut cursor, 20)?);
        let script_hash = ScriptHash(hash);

        let stored = read_u32_le(bytes, &mut cursor)?;
        let computed = checksum(&bytes[..CHECKSUM_COVERED_SIZE]);
        if stored != computed {
            return Err(BytecodeError::ChecksumMismatch { stored, computed });
        }

        let len = usize::try_from(read_var_int(bytes, &mut cursor)?).unwrap_or(usize::MAX);
        if len > MAX_SCRIPT_LENGTH {
            return Err(BytecodeError::ContainerOverflow {
                field: "script",
                len,
                max: MAX_SCRIPT_LENGTH,
            });
        }
        let script = read_bytes(bytes, &mut cursor, len)?.to_vec();

        if cursor != bytes.len() {
            return Err(BytecodeError::TrailingBytes(bytes.len() - cursor));
        }
        if ScriptHash::of(&script) != script_hash {
            return Err(BytecodeError::ScriptHashMismatch);
        }

        Ok(Self {
            compiler,
            version,
            script_hash,
            checksum: stored,
            script,
        })
    }

    /// Write the container to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read a container from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

fn truncate_name(name: &str) -> String {
    // The field is NUL padded, so the name ends at its first NUL
    let name = name.find('\0').map_or(name, |nul| &name[..nul]);
    if name.len() <= COMPILER_FIELD_SIZE {
        return name.to_string();
    }
    let mut end = COMPILER_FIELD_SIZE;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Encoded size of a variable-length integer
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..0xFD => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Append a variable-length integer
pub fn write_var_int(out: &mut Vec<u8>, value: u64) {
    match value {
        0..0xFD => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn read_var_int(buf: &[u8], cursor: &mut usize) -> Result<u64> {
    let tag = read_bytes(buf, cursor, 1)?[0];
    let value = match tag {
        0xFD => {
            let raw = read_bytes(buf, cursor, 2)?;
            u64::from(u16::from_le_bytes([raw[0], raw[1]]))
        }
        0xFE => u64::from(read_u32_le(buf, cursor)?),
        0xFF => {
            let raw = read_bytes(buf, cursor, 8)?;
            u64::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ])
        }
        small => u64::from(small),
    };
    Ok(value)
}

fn read_u32_le(buf: &[u8], cursor: &mut usize) -> Result<u32> {
    let raw = read_bytes(buf, cursor, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_bytes<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *cursor;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(BytecodeError::UnexpectedEnd(start))?;
    *cursor = end;
    Ok(&buf[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> NefFile {
        NefFile::new(vec![0x01, 0x02, 0x03], "abc", Version::parse("1.2.3")).unwrap()
    }

    #[test]
    fn test_three_byte_script_layout() {
        let nef = sample();
        let bytes = nef.to_bytes();

        assert_eq!(bytes.len(), 4 + 32 + 16 + 20 + 4 + 1 + 3);
        assert_eq!(bytes.len(), 80);
        assert_eq!(nef.size(), 80);
        assert_eq!(&bytes[..4], b"NEF3");
        assert_eq!(&bytes[4..7], b"abc");
        assert!(bytes[7..36].iter().all(|&b| b == 0));
        assert_eq!(&bytes[36..40], &1u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &2u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &3u32.to_le_bytes());
        assert_eq!(&bytes[48..52], &0u32.to_le_bytes());
        assert_eq!(&bytes[52..72], ScriptHash::of(&[1, 2, 3]).as_bytes());
        assert_eq!(&bytes[72..76], &checksum(&bytes[..72]).to_le_bytes());
        assert_eq!(&bytes[76..], &[0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_nef_roundtrip() {
        let nef = sample();
        let restored = NefFile::from_bytes(&nef.to_bytes()).unwrap();
        assert_eq!(restored, nef);
        assert_eq!(restored.to_bytes(), nef.to_bytes());
    }

    #[test]
    fn test_io_roundtrip() {
        let nef = sample();
        let mut buffer = Vec::new();
        nef.write_to(&mut buffer).unwrap();
        let restored = NefFile::read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(restored, nef);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        assert_eq!(sample().to_bytes(), sample().to_bytes());
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("1.2.3"), Version::new(1, 2, 3, 0));
        assert_eq!(Version::parse("4.5.6.7"), Version::new(4, 5, 6, 7));
        assert_eq!(Version::parse("0.x.9-rc1"), Version::new(0, 0, 9, 0));
        assert_eq!(Version::parse("1.2.3-beta"), Version::new(1, 2, 3, 0));
        assert_eq!(Version::parse("3.1rc.0.12b"), Version::new(3, 1, 0, 12));
        assert_eq!(Version::parse(" 7.8 "), Version::new(7, 8, 0, 0));
        assert_eq!(Version::parse("2"), Version::new(2, 0, 0, 0));
        assert_eq!(Version::new(1, 2, 3, 0).to_string(), "1.2.3.0");
    }

    #[test]
    fn test_compiler_name_truncated() {
        let long = "x".repeat(40);
        let nef = NefFile::new(vec![0x40], &long, Version::default()).unwrap();
        assert_eq!(nef.compiler().len(), 32);
        assert_eq!(nef.to_bytes().len(), 4 + 32 + 16 + 20 + 4 + 1 + 1);

        let wide = "é".repeat(20);
        let nef = NefFile::new(vec![0x40], &wide, Version::default()).unwrap();
        assert_eq!(nef.compiler(), "é".repeat(16));
        assert_eq!(NefFile::from_bytes(&nef.to_bytes()).unwrap(), nef);
    }

    #[test]
    fn test_compiler_name_ends_at_nul() {
        let nef = NefFile::new(vec![0x40], "a\0b", Version::default()).unwrap();
        assert_eq!(nef.compiler(), "a");
        let bytes = nef.to_bytes();
        assert!(bytes[5..36].iter().all(|&b| b == 0));
        assert_eq!(NefFile::from_bytes(&bytes).unwrap(), nef);

        let nef = NefFile::new(vec![0x40], "\0abc", Version::default()).unwrap();
        assert_eq!(nef.compiler(), "");
        assert_eq!(NefFile::from_bytes(&nef.to_bytes()).unwrap(), nef);
    }

    #[test]
    fn test_script_too_long() {
        let result = NefFile::new(vec![0; MAX_SCRIPT_LENGTH + 1], "c", Version::default());
        assert!(matches!(
            result,
            Err(BytecodeError::ContainerOverflow { field: "script", .. })
        ));
        assert!(NefFile::new(vec![0; MAX_SCRIPT_LENGTH], "c", Version::default()).is_ok());
    }

    #[test]
    fn test_rejects_corruption() {
        let bytes = sample().to_bytes();

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xFF;
        assert!(matches!(
            NefFile::from_bytes(&bad_magic),
            Err(BytecodeError::InvalidMagic(_))
        ));

        let mut bad_version = bytes.clone();
        bad_version[40] ^= 0x01;
        assert!(matches!(
            NefFile::from_bytes(&bad_version),
            Err(BytecodeError::ChecksumMismatch { .. })
        ));

        let mut bad_script = bytes.clone();
        *bad_script.last_mut().unwrap() ^= 0x01;
        assert!(matches!(
            NefFile::from_bytes(&bad_script),
            Err(BytecodeError::ScriptHashMismatch)
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            NefFile::from_bytes(&trailing),
            Err(BytecodeError::TrailingBytes(1))
        ));

        assert!(matches!(
            NefFile::from_bytes(&bytes[..50]),
            Err(BytecodeError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_var_int_widths() {
        for (value, size) in [(0u64, 1), (0xFC, 1), (0xFD, 3), (0xFFFF, 3), (0x1_0000, 5)] {
            let mut out = Vec::new();
            write_var_int(&mut out, value);
            assert_eq!(out.len(), size);
            assert_eq!(var_int_size(value), size);
            let mut cursor = 0;
            assert_eq!(read_var_int(&out, &mut cursor).unwrap(), value);
            assert_eq!(cursor, size);
        }
    }

    #[test]
    fn test_large_script_uses_wide_prefix() {
        let nef = NefFile::new(vec![0x21; 300], "c", Version::default()).unwrap();
        let bytes = nef.to_bytes();
        assert_eq!(bytes[76], 0xFD);
        assert_eq!(&bytes[77..79], &300u16.to_le_bytes());
        assert_eq!(NefFile::from_bytes(&bytes).unwrap(), nef);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            script in proptest::collection::vec(any::<u8>(), 0..600),
            name in "[a-zA-Z0-9 ._-]{0,40}",
            parts in any::<[u32; 4]>(),
        ) {
            let version = Version::new(parts[0], parts[1], parts[2], parts[3]);
            let nef = NefFile::new(script, &name, version).unwrap();
            let bytes = nef.to_bytes();
            prop_assert_eq!(bytes.len(), nef.size());
            let restored = NefFile::from_bytes(&bytes).unwrap();
            prop_assert_eq!(restored.to_bytes(), bytes);
            prop_assert_eq!(restored, nef);
        }

        #[test]
        fn prop_checksum_sensitive_to_header_bytes(index in 0usize..CHECKSUM_COVERED_SIZE, flip in 1u8..=255) {
            let bytes = sample().to_bytes();
            let mut changed = bytes[..CHECKSUM_COVERED_SIZE].to_vec();
            changed[index] ^= flip;
            prop_assert_ne!(checksum(&changed), checksum(&bytes[..CHECKSUM_COVERED_SIZE]));
        }
    }
}
