//! Intel HEX program loader.
//!
//! OpenOCD uploads over the bitbang protocol at a few hundred bytes per
//! minute, so the emulator takes its program image from a HEX file up front
//! instead. Records fold into the segment map of [`ProgramImage`]; data
//! bytes are assembled most-significant-first into 32-bit words.

use std::fs;
use std::path::Path;

use ihex::Record;

use crate::image::ProgramImage;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The image file could not be read.
    #[error("could not read program image file")]
    Io(#[from] std::io::Error),
    /// The file is not valid Intel HEX.
    #[error("could not read ihex format")]
    IhexRead(#[from] ihex::ReaderError),
}

/// Load a program image from an Intel HEX file.
pub fn load_image(path: &Path) -> Result<ProgramImage, LoaderError> {
    let data = fs::read_to_string(path)?;
    let image = parse_image(&data)?;
    tracing::info!(
        "loaded {} with {} segment(s), start address {:#010x}",
        path.display(),
        image.segment_count(),
        image.start_address()
    );
    Ok(image)
}

/// Fold an Intel HEX document into a program image.
pub fn parse_image(data: &str) -> Result<ProgramImage, LoaderError> {
    let mut image = ProgramImage::new();
    let mut base_address = 0u32;

    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                let mut address = base_address.wrapping_add(offset as u32);
                for chunk in value.chunks(4) {
                    let mut word = 0u32;
                    for &byte in chunk {
                        word = word << 8 | byte as u32;
                    }
                    image.write_word(address, word);
                    address = address.wrapping_add(4);
                }
            }
            Record::ExtendedSegmentAddress(address) => {
                base_address = (address as u32) << 4;
            }
            Record::ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            Record::StartSegmentAddress { cs, ip } => {
                image.set_start_address(((cs as u32) << 4).wrapping_add(ip as u32));
            }
            Record::StartLinearAddress(address) => {
                image.set_start_address(address);
            }
            Record::EndOfFile => {}
        }
    }

    Ok(image)
}
