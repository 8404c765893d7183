//! Byte-stable ZIP bundling of exported sources.
//!
//! Entries are stored uncompressed, sorted alphabetically, and stamped
//! with a fixed DOS timestamp so repeated exports of the same descriptor
//! set produce identical archives.

use flate2::Crc;

use crate::error::ExportError;
use crate::printer::ProtoFile;

// 1980-01-01 00:00:00, the DOS epoch.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = 0x0021;

/// Write the files into a deterministic archive.
pub fn write_zip(files: &[ProtoFile]) -> Result<Vec<u8>, ExportError> {
    let mut sorted: Vec<&ProtoFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = Vec::new();
    let mut central = Vec::new();
    let mut count: u16 = 0;

    for file in sorted {
        if file.name.len() > u16::MAX as usize {
            return Err(ExportError::Zip(format!(
                "entry name too long: {}",
                file.name
            )));
        }
        let data = file.content.as_bytes();
        let mut crc = Crc::new();
        crc.update(data);
        let crc32 = crc.sum();
        let offset = out.len() as u32;

        // Local file header.
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&DOS_TIME.to_le_bytes());
        out.extend_from_slice(&DOS_DATE.to_le_bytes());
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(file.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra length
        out.extend_from_slice(file.name.as_bytes());
        out.extend_from_slice(data);

        // Central directory record.
        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes()); // made by
        central.extend_from_slice(&20u16.to_le_bytes()); // needed
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&DOS_TIME.to_le_bytes());
        central.extend_from_slice(&DOS_DATE.to_le_bytes());
        central.extend_from_slice(&crc32.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(file.name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // extra
        central.extend_from_slice(&0u16.to_le_bytes()); // comment
        central.extend_from_slice(&0u16.to_le_bytes()); // disk
        central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(file.name.as_bytes());

        count = count
            .checked_add(1)
            .ok_or_else(|| ExportError::Zip("too many entries".to_owned()))?;
    }

    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);
    let central_len = out.len() as u32 - central_offset;

    // End of central directory.
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // disk number
    out.extend_from_slice(&0u16.to_le_bytes()); // central dir disk
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&central_len.to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment length

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ProtoFile> {
        vec![
            ProtoFile {
                name: "b.proto".to_owned(),
                content: "syntax = \"proto3\";\n".to_owned(),
            },
            ProtoFile {
                name: "a.proto".to_owned(),
                content: "syntax = \"proto3\";\n".to_owned(),
            },
        ]
    }

    #[test]
    fn archives_are_byte_stable() {
        let once = write_zip(&sample()).unwrap();
        let twice = write_zip(&sample()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn entries_are_sorted_regardless_of_input_order() {
        let bytes = write_zip(&sample()).unwrap();
        let a = bytes.windows(7).position(|w| w == b"a.proto").unwrap();
        let b = bytes.windows(7).position(|w| w == b"b.proto").unwrap();
        assert!(a < b);
    }

    #[test]
    fn end_of_central_directory_is_present() {
        let bytes = write_zip(&sample()).unwrap();
        let eocd = 0x0605_4b50u32.to_le_bytes();
        assert!(bytes.windows(4).any(|w| w == eocd));
    }
}
