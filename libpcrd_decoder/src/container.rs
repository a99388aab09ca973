// The instrument wraps its experiment document in a single-entry ZIP archive
// protected with the legacy "traditional PKWARE" stream cipher. The archive
// layout we accept is narrow:
//
// [local header][12 byte encryption header + encrypted data][central directory][EOCD]
//
// with exactly one entry, no Zip64 and either stored or deflated data. Anything
// else is reported as a ContainerError rather than guessed at.
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read, Seek, SeekFrom};

use super::error::ContainerError;

const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
const END_OF_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
const END_OF_DIRECTORY_SIZE: usize = 22;
const MAX_COMMENT_SIZE: usize = u16::MAX as usize;
const LOCAL_HEADER_SIZE: u64 = 30;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const METHOD_AES: u16 = 99;

const ZIP64_MARKER: u32 = u32::MAX;
pub(crate) const ENCRYPTION_HEADER_SIZE: usize = 12;

/// CRC-32 (IEEE) lookup table used by the key schedule of the stream cipher
const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB88320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

fn crc32_byte(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8)
}

/// The three-key state of the legacy ZIP stream cipher.
///
/// Keys are seeded from the secret and then advanced by every plaintext byte, so the
/// same state type is used to decrypt (and, in tests, to encrypt).
#[derive(Debug, Clone)]
pub(crate) struct ZipCryptoKeys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCryptoKeys {
    pub(crate) fn new(secret: &[u8]) -> Self {
        let mut keys = Self {
            key0: 0x12345678,
            key1: 0x23456789,
            key2: 0x34567890,
        };
        for byte in secret {
            keys.update(*byte);
        }
        keys
    }

    fn update(&mut self, plain: u8) {
        self.key0 = crc32_byte(self.key0, plain);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xff)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.key2 = crc32_byte(self.key2, (self.key1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) & 0xffff;
        ((temp * (temp ^ 1)) >> 8) as u8
    }

    pub(crate) fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    #[cfg(test)]
    pub(crate) fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }
}

/// The directory metadata of the single archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    local_header_offset: u64,
}

impl EntryInfo {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// The byte the encryption header must decrypt to as its final byte
    fn check_byte(&self) -> u8 {
        if self.flags & FLAG_DATA_DESCRIPTOR != 0 {
            (self.mod_time >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }
}

fn check_remaining(
    cursor: &Cursor<&[u8]>,
    offset: u64,
    needed: u64,
) -> Result<(), ContainerError> {
    if offset + needed > cursor.get_ref().len() as u64 {
        Err(ContainerError::Truncated(offset))
    } else {
        Ok(())
    }
}

/// Find the end-of-central-directory record by scanning backwards over the (optional) comment
fn find_end_of_directory(bytes: &[u8]) -> Result<usize, ContainerError> {
    if bytes.len() < END_OF_DIRECTORY_SIZE {
        return Err(ContainerError::MissingDirectory);
    }
    let last = bytes.len() - END_OF_DIRECTORY_SIZE;
    let first = last.saturating_sub(MAX_COMMENT_SIZE);
    let signature = END_OF_DIRECTORY_SIGNATURE.to_le_bytes();
    (first..=last)
        .rev()
        .find(|idx| bytes[*idx..*idx + 4] == signature)
        .ok_or(ContainerError::MissingDirectory)
}

/// Read the directory of the archive and return the metadata of its one entry
pub fn read_single_entry(bytes: &[u8]) -> Result<EntryInfo, ContainerError> {
    let eocd_offset = find_end_of_directory(bytes)?;
    let mut cursor = Cursor::new(bytes);
    cursor.seek(SeekFrom::Start(eocd_offset as u64 + 4))?;
    let _disk = cursor.read_u16::<LittleEndian>()?;
    let _directory_disk = cursor.read_u16::<LittleEndian>()?;
    let _entries_on_disk = cursor.read_u16::<LittleEndian>()?;
    let total_entries = cursor.read_u16::<LittleEndian>()?;
    let directory_size = cursor.read_u32::<LittleEndian>()?;
    let directory_offset = cursor.read_u32::<LittleEndian>()?;

    if total_entries != 1 {
        return Err(ContainerError::UnexpectedEntryCount(total_entries));
    }
    if directory_size == ZIP64_MARKER || directory_offset == ZIP64_MARKER {
        return Err(ContainerError::Zip64Unsupported);
    }

    let offset = directory_offset as u64;
    check_remaining(&cursor, offset, 46)?;
    cursor.seek(SeekFrom::Start(offset))?;
    if cursor.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
        return Err(ContainerError::BadSignature("central directory"));
    }
    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let mod_time = cursor.read_u16::<LittleEndian>()?;
    let _mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
    let name_length = cursor.read_u16::<LittleEndian>()?;
    let _extra_length = cursor.read_u16::<LittleEndian>()?;
    let _comment_length = cursor.read_u16::<LittleEndian>()?;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attributes = cursor.read_u16::<LittleEndian>()?;
    let _external_attributes = cursor.read_u32::<LittleEndian>()?;
    let local_header_offset = cursor.read_u32::<LittleEndian>()?;

    if compressed_size == ZIP64_MARKER
        || uncompressed_size == ZIP64_MARKER
        || local_header_offset == ZIP64_MARKER
    {
        return Err(ContainerError::Zip64Unsupported);
    }

    check_remaining(&cursor, cursor.position(), name_length as u64)?;
    let mut name = vec![0u8; name_length as usize];
    cursor.read_exact(&mut name)?;

    Ok(EntryInfo {
        name: String::from_utf8_lossy(&name).into_owned(),
        flags,
        method,
        mod_time,
        crc32,
        compressed_size: compressed_size as u64,
        uncompressed_size: uncompressed_size as u64,
        local_header_offset: local_header_offset as u64,
    })
}

/// Locate the entry data behind the local header. Sizes come from the central directory,
/// as the local header may carry zeros when a data descriptor follows the data.
fn entry_data<'a>(bytes: &'a [u8], entry: &EntryInfo) -> Result<&'a [u8], ContainerError> {
    let mut cursor = Cursor::new(bytes);
    check_remaining(&cursor, entry.local_header_offset, LOCAL_HEADER_SIZE)?;
    cursor.seek(SeekFrom::Start(entry.local_header_offset))?;
    if cursor.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
        return Err(ContainerError::BadSignature("local header"));
    }
    cursor.seek(SeekFrom::Start(entry.local_header_offset + 26))?;
    let name_length = cursor.read_u16::<LittleEndian>()? as u64;
    let extra_length = cursor.read_u16::<LittleEndian>()? as u64;
    let data_start = entry.local_header_offset + LOCAL_HEADER_SIZE + name_length + extra_length;
    check_remaining(&cursor, data_start, entry.compressed_size)?;
    let start = data_start as usize;
    let end = start + entry.compressed_size as usize;
    Ok(&bytes[start..end])
}

/// Strip and verify the encryption header, then decrypt the remaining payload
fn decrypt(data: &[u8], entry: &EntryInfo, secret: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if data.len() < ENCRYPTION_HEADER_SIZE {
        return Err(ContainerError::Truncated(entry.local_header_offset));
    }
    let mut keys = ZipCryptoKeys::new(secret);
    let mut last = 0u8;
    for byte in &data[..ENCRYPTION_HEADER_SIZE] {
        last = keys.decrypt_byte(*byte);
    }
    if last != entry.check_byte() {
        return Err(ContainerError::WrongSecret);
    }
    Ok(data[ENCRYPTION_HEADER_SIZE..]
        .iter()
        .map(|byte| keys.decrypt_byte(*byte))
        .collect())
}

fn decompress(payload: Vec<u8>, entry: &EntryInfo) -> Result<Vec<u8>, ContainerError> {
    match entry.method {
        METHOD_STORED => Ok(payload),
        METHOD_DEFLATED => {
            // One byte past the declared size is enough for `verify` to see the mismatch
            let mut inflated = Vec::new();
            DeflateDecoder::new(payload.as_slice())
                .take(entry.uncompressed_size.saturating_add(1))
                .read_to_end(&mut inflated)
                .map_err(ContainerError::Inflate)?;
            Ok(inflated)
        }
        other => Err(ContainerError::UnsupportedCompression(other)),
    }
}

fn verify(document: &[u8], entry: &EntryInfo) -> Result<(), ContainerError> {
    let mut crc = flate2::Crc::new();
    crc.update(document);
    let found = crc.sum();
    if found != entry.crc32 || document.len() as u64 != entry.uncompressed_size {
        return Err(ContainerError::ChecksumMismatch {
            expected: entry.crc32,
            found,
            expected_size: entry.uncompressed_size,
            found_size: document.len() as u64,
        });
    }
    Ok(())
}

/// Open an instrument archive and return the bytes of the single document inside.
///
/// The secret is supplied by the caller; this function has no side effects.
pub fn open_container(bytes: &[u8], secret: &str) -> Result<Vec<u8>, ContainerError> {
    let entry = read_single_entry(bytes)?;
    spdlog::debug!(
        "Container entry {} -- method {}, {} compressed, {} uncompressed",
        entry.name,
        entry.method,
        human_bytes::human_bytes(entry.compressed_size as f64),
        human_bytes::human_bytes(entry.uncompressed_size as f64)
    );

    if entry.flags & FLAG_STRONG_ENCRYPTION != 0 || entry.method == METHOD_AES {
        return Err(ContainerError::UnsupportedEncryption {
            flags: entry.flags,
            method: entry.method,
        });
    }

    let data = entry_data(bytes, &entry)?;
    let payload = if entry.is_encrypted() {
        decrypt(data, &entry, secret.as_bytes())?
    } else {
        spdlog::warn!(
            "Container entry {} is not encrypted; the secret was not used",
            entry.name
        );
        data.to_vec()
    };

    let document = match decompress(payload, &entry) {
        Ok(doc) => doc,
        // A wrong secret that slips past the one-byte header check decrypts to noise
        Err(ContainerError::Inflate(e)) if entry.is_encrypted() => {
            spdlog::debug!("Inflate failed after decryption: {e}");
            return Err(ContainerError::WrongSecret);
        }
        Err(e) => return Err(e),
    };
    verify(&document, &entry)?;
    Ok(document)
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{seal_document, SealOptions};

    const SECRET: &str = "not-the-real-secret";
    const DOCUMENT: &[u8] = b"<experimentalData2><plateSetup2 rows=\"8\" columns=\"12\"/></experimentalData2>";

    #[test]
    fn test_crc_table_matches_flate2() {
        let mut crc = flate2::Crc::new();
        crc.update(DOCUMENT);
        let manual = !DOCUMENT
            .iter()
            .fold(0xFFFF_FFFFu32, |acc, byte| crc32_byte(acc, *byte));
        assert_eq!(crc.sum(), manual);
    }

    #[test]
    fn test_cipher_round_trip() {
        let mut enc = ZipCryptoKeys::new(SECRET.as_bytes());
        let mut dec = ZipCryptoKeys::new(SECRET.as_bytes());
        let cipher: Vec<u8> = DOCUMENT.iter().map(|b| enc.encrypt_byte(*b)).collect();
        assert_ne!(cipher.as_slice(), DOCUMENT);
        let plain: Vec<u8> = cipher.iter().map(|b| dec.decrypt_byte(*b)).collect();
        assert_eq!(plain.as_slice(), DOCUMENT);
    }

    #[test]
    fn test_open_stored_and_deflated() {
        for deflate in [false, true] {
            let archive = seal_document(
                DOCUMENT,
                SECRET,
                &SealOptions {
                    deflate,
                    ..Default::default()
                },
            );
            let document = open_container(&archive, SECRET).unwrap();
            assert_eq!(document.as_slice(), DOCUMENT);
        }
    }

    #[test]
    fn test_open_with_data_descriptor_check_byte() {
        let archive = seal_document(
            DOCUMENT,
            SECRET,
            &SealOptions {
                data_descriptor: true,
                ..Default::default()
            },
        );
        assert_eq!(open_container(&archive, SECRET).unwrap().as_slice(), DOCUMENT);
    }

    #[test]
    fn test_wrong_secret() {
        let archive = seal_document(DOCUMENT, SECRET, &SealOptions::default());
        let result = open_container(&archive, "definitely wrong");
        assert!(matches!(
            result,
            Err(ContainerError::WrongSecret) | Err(ContainerError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unencrypted_entry_is_accepted() {
        let archive = seal_document(
            DOCUMENT,
            SECRET,
            &SealOptions {
                encrypt: false,
                ..Default::default()
            },
        );
        assert_eq!(open_container(&archive, "ignored").unwrap().as_slice(), DOCUMENT);
    }

    #[test]
    fn test_entry_count_must_be_one() {
        let archive = seal_document(
            DOCUMENT,
            SECRET,
            &SealOptions {
                declared_entries: 2,
                ..Default::default()
            },
        );
        assert!(matches!(
            open_container(&archive, SECRET),
            Err(ContainerError::UnexpectedEntryCount(2))
        ));
    }

    #[test]
    fn test_not_an_archive() {
        assert!(matches!(
            open_container(b"plain text is not a zip archive at all", SECRET),
            Err(ContainerError::MissingDirectory)
        ));
    }

    #[test]
    fn test_inflate_stops_past_declared_size() {
        let mut archive = seal_document(
            DOCUMENT,
            SECRET,
            &SealOptions {
                deflate: true,
                ..Default::default()
            },
        );
        // Understate the uncompressed size in the central directory record
        let eocd = archive.len() - 22;
        let directory = u32::from_le_bytes(archive[eocd + 16..eocd + 20].try_into().unwrap());
        let size_field = directory as usize + 24;
        archive[size_field..size_field + 4].copy_from_slice(&10u32.to_le_bytes());
        match open_container(&archive, SECRET) {
            Err(ContainerError::ChecksumMismatch {
                expected_size,
                found_size,
                ..
            }) => {
                assert_eq!(expected_size, 10);
                assert_eq!(found_size, 11);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_payload() {
        let mut archive = seal_document(DOCUMENT, SECRET, &SealOptions::default());
        // Flip a byte well past the encryption header but inside the entry data
        archive[30 + "experiment.xml".len() + ENCRYPTION_HEADER_SIZE + 5] ^= 0x5A;
        assert!(matches!(
            open_container(&archive, SECRET),
            Err(ContainerError::ChecksumMismatch { .. })
        ));
    }
}
