use thiserror::Error;
use tracing::debug;

use crate::bytecode::{
    compile_error::CompileError,
    op::{DecodeError, INSTR_WIDTH, Instr, WORD_WIDTH},
};

pub const MAGIC: [u8; 4] = *b"P0IM";

/// Magic plus five `u32` header fields.
pub const HEADER_LEN: usize = MAGIC.len() + 5 * 4;

/// Placement knobs for the memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    /// Lowest byte address the data segment may start at.
    pub data_min: u32,
    /// Bytes of stack between the end of the data segment and the stack
    /// bottom.
    pub stack_reserve: u32,
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self {
            data_min: 1024,
            stack_reserve: 4096,
        }
    }
}

/// Segment boundaries in bytes. All fields are derived; none is stored
/// independently of the text, the data and the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub text_start: u32,
    pub text_length: u32,
    pub data_start: u32,
    pub data_length: u32,
    pub stack_bottom: u32,
}

impl Header {
    pub fn data_end(&self) -> u32 {
        self.data_start + self.data_length
    }

    fn derive(text_len: usize, data_len: usize, layout: ImageLayout) -> Result<Self, CompileError> {
        let too_big = |what: &'static str, value: u64| {
            CompileError::overflow(what, value as i64, u32::MAX as i64)
        };

        let text_bytes = text_len as u64 * INSTR_WIDTH as u64;
        let text_length = u32::try_from(text_bytes).map_err(|_| too_big("text segment", text_bytes))?;

        let data_bytes = data_len as u64 * WORD_WIDTH as u64;
        let data_length = u32::try_from(data_bytes).map_err(|_| too_big("data segment", data_bytes))?;

        let word = WORD_WIDTH as u64;
        let unaligned = text_length.max(layout.data_min) as u64;
        let aligned = unaligned.div_ceil(word) * word;
        let data_start = u32::try_from(aligned).map_err(|_| too_big("data start", aligned))?;

        let bottom = data_start as u64 + data_length as u64 + layout.stack_reserve as u64;
        let stack_bottom = u32::try_from(bottom).map_err(|_| too_big("stack bottom", bottom))?;

        Ok(Self {
            text_start: 0,
            text_length,
            data_start,
            data_length,
            stack_bottom,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image error: bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("image error: expected {expected} bytes, found {found}")]
    Length { expected: usize, found: usize },

    #[error("image error: inconsistent header: {0}")]
    Header(String),

    #[error("image error: instruction {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

/// A complete executable: text, data and layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    text: Vec<Instr>,
    data: Vec<i32>,
    layout: ImageLayout,
    header: Header,
}

impl ProgramImage {
    /// Fails when any derived header field does not fit in 32 bits.
    pub fn new(text: Vec<Instr>, data: Vec<i32>, layout: ImageLayout) -> Result<Self, CompileError> {
        let header = Header::derive(text.len(), data.len(), layout)?;
        Ok(Self {
            text,
            data,
            layout,
            header,
        })
    }

    pub fn text(&self) -> &[Instr] {
        &self.text
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// The whole file, built in memory so a failure leaves nothing half
    /// written.
    pub fn to_bytes(&self) -> Vec<u8> {
        let h = self.header;
        let mut out =
            Vec::with_capacity(HEADER_LEN + h.text_length as usize + h.data_length as usize);

        out.extend_from_slice(&MAGIC);
        for field in [
            h.text_start,
            h.text_length,
            h.data_start,
            h.data_length,
            h.stack_bottom,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for instr in &self.text {
            out.extend_from_slice(&instr.encode());
        }
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }

        debug!(
            instructions = self.text.len(),
            words = self.data.len(),
            bytes = out.len(),
            "image serialized"
        );
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_LEN {
            return Err(ImageError::Length {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(ImageError::BadMagic(magic));
        }

        let field = |i: usize| {
            let at = MAGIC.len() + i * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let header = Header {
            text_start: field(0),
            text_length: field(1),
            data_start: field(2),
            data_length: field(3),
            stack_bottom: field(4),
        };
        check_header(&header)?;

        let expected = HEADER_LEN + header.text_length as usize + header.data_length as usize;
        if bytes.len() != expected {
            return Err(ImageError::Length {
                expected,
                found: bytes.len(),
            });
        }

        let text_bytes = &bytes[HEADER_LEN..HEADER_LEN + header.text_length as usize];
        let text = text_bytes
            .chunks_exact(INSTR_WIDTH)
            .enumerate()
            .map(|(index, chunk)| {
                let mut raw = [0u8; INSTR_WIDTH];
                raw.copy_from_slice(chunk);
                Instr::decode(raw).map_err(|source| ImageError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data = bytes[HEADER_LEN + header.text_length as usize..]
            .chunks_exact(WORD_WIDTH)
            .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        let layout = ImageLayout {
            data_min: header.data_start,
            stack_reserve: header.stack_bottom - header.data_end(),
        };

        Ok(Self {
            text,
            data,
            layout,
            header,
        })
    }
}

fn check_header(h: &Header) -> Result<(), ImageError> {
    let bad = |msg: String| Err(ImageError::Header(msg));

    if h.text_start != 0 {
        return bad(format!("text starts at {}, expected 0", h.text_start));
    }
    if h.text_length as usize % INSTR_WIDTH != 0 {
        return bad(format!("text length {} is not a whole number of instructions", h.text_length));
    }
    if h.data_length as usize % WORD_WIDTH != 0 {
        return bad(format!("data length {} is not a whole number of words", h.data_length));
    }
    if h.data_start as usize % WORD_WIDTH != 0 || h.data_start < h.text_length {
        return bad(format!("data start {} overlaps text or is unaligned", h.data_start));
    }
    match h.data_start.checked_add(h.data_length) {
        Some(end) if end <= h.stack_bottom => Ok(()),
        _ => bad(format!("stack bottom {} is inside the data segment", h.stack_bottom)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Reg;

    fn image(text_len: usize, data: Vec<i32>, layout: ImageLayout) -> ProgramImage {
        ProgramImage::new(vec![Instr::Rtn; text_len], data, layout).unwrap()
    }

    #[test]
    fn test_header_is_derived_from_sizes() {
        let img = image(3, vec![1, 2], ImageLayout::default());
        let h = img.header();

        assert_eq!(h.text_start, 0);
        assert_eq!(h.text_length, 24);
        assert_eq!(h.data_start, 1024);
        assert_eq!(h.data_length, 8);
        assert_eq!(h.stack_bottom, 1024 + 8 + 4096);
    }

    #[test]
    fn test_large_text_pushes_data_start() {
        let layout = ImageLayout {
            data_min: 16,
            stack_reserve: 64,
        };
        let img = image(5, vec![], layout);
        assert_eq!(img.header().data_start, 40);
    }

    #[test]
    fn test_data_start_is_word_aligned() {
        let layout = ImageLayout {
            data_min: 10,
            stack_reserve: 0,
        };
        assert_eq!(image(0, vec![], layout).header().data_start, 12);
    }

    #[test]
    fn test_overflowing_layout_is_rejected() {
        let layout = ImageLayout {
            data_min: u32::MAX - 3,
            stack_reserve: 16,
        };
        let err = ProgramImage::new(vec![], vec![7], layout).unwrap_err();
        assert!(matches!(err, CompileError::CapacityOverflow { .. }));
    }

    #[test]
    fn test_file_layout_is_bit_exact() {
        let layout = ImageLayout {
            data_min: 8,
            stack_reserve: 4,
        };
        let img = ProgramImage::new(vec![Instr::Exit { code: 0 }], vec![-2], layout).unwrap();
        let bytes = img.to_bytes();

        assert_eq!(&bytes[..4], b"P0IM");
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &8u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &8u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &16u32.to_le_bytes());
        assert_eq!(&bytes[24..32], &Instr::Exit { code: 0 }.encode());
        assert_eq!(&bytes[32..36], &(-2i32).to_le_bytes());
        assert_eq!(bytes.len(), 36);
    }

    #[test]
    fn test_read_back_reproduces_header() {
        let text = vec![
            Instr::Sri { reg: Reg::Sp, imm: 1 },
            Instr::Cpw {
                t: Reg::Sp,
                ot: 0,
                s: Reg::Gp,
                os: 1,
            },
            Instr::Exit { code: 0 },
        ];
        let img = ProgramImage::new(text, vec![4, 9], ImageLayout::default()).unwrap();
        let back = ProgramImage::from_bytes(&img.to_bytes()).unwrap();

        assert_eq!(back.header(), img.header());
        assert_eq!(back.text(), img.text());
        assert_eq!(back.data(), img.data());
        assert_eq!(back.to_bytes(), img.to_bytes());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = image(1, vec![], ImageLayout::default()).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ProgramImage::from_bytes(&bytes),
            Err(ImageError::BadMagic(_))
        ));
    }

    #[test]
    fn test_truncated_image() {
        let bytes = image(2, vec![1], ImageLayout::default()).to_bytes();
        assert!(matches!(
            ProgramImage::from_bytes(&bytes[..bytes.len() - 1]),
            Err(ImageError::Length { .. })
        ));
        assert!(matches!(
            ProgramImage::from_bytes(&bytes[..10]),
            Err(ImageError::Length { .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_in_text() {
        let mut bytes = image(2, vec![], ImageLayout::default()).to_bytes();
        bytes[HEADER_LEN + INSTR_WIDTH] = 0xee;
        let err = ProgramImage::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ImageError::Decode { index: 1, .. }));
    }

    #[test]
    fn test_inconsistent_header() {
        let mut bytes = image(1, vec![], ImageLayout::default()).to_bytes();
        // stack bottom below data start
        bytes[20..24].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            ProgramImage::from_bytes(&bytes),
            Err(ImageError::Header(_))
        ));
    }
}
