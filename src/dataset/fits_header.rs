//! Minimal FITS header reader.
//!
//! Only what the dataset inspection needs: the keyword values of the primary
//! HDU and of the first extension of an event file, plain or gzip-compressed.
//!
//! A header is a sequence of 2880-byte blocks made of 80-byte cards, closed
//! by an `END` card. Between the two headers, the primary data unit is
//! skipped using `NAXIS*`, `BITPIX`, `PCOUNT` and `GCOUNT`.
//!
//! Card values are parsed with `nom`:
//!
//! | FITS value            | [`HeaderValue`]          |
//! |-----------------------|--------------------------|
//! | `'xti20240206'`       | `Str("xti20240206")`     |
//! | `T` / `F`             | `Logical(true / false)`  |
//! | `42`                  | `Int(42)`                |
//! | `83.63308`, `1.0D-3`  | `Real(..)`               |
//!
//! Anything else (complex values, undefined values) is ignored.
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, Read},
};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, none_of, space0},
    combinator::{map, map_opt, value},
    multi::fold_many0,
    sequence::{delimited, preceded},
    IResult, Parser,
};

use crate::{constants::GZ_EXTENSION, xtipipe_errors::XtiPipeError};

const CARD_SIZE: usize = 80;
const BLOCK_SIZE: usize = 2880;
const MAX_NAXIS: i64 = 999;

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Logical(bool),
    Int(i64),
    Real(f64),
}

fn string_value(input: &str) -> IResult<&str, HeaderValue> {
    map(
        delimited(
            char('\''),
            fold_many0(
                alt((value('\'', tag("''")), none_of("'"))),
                String::new,
                |mut acc: String, c| {
                    acc.push(c);
                    acc
                },
            ),
            char('\''),
        ),
        |s: String| HeaderValue::Str(s.trim_end().to_string()),
    )
    .parse(input)
}

fn logical_value(input: &str) -> IResult<&str, HeaderValue> {
    alt((
        value(HeaderValue::Logical(true), char('T')),
        value(HeaderValue::Logical(false), char('F')),
    ))
    .parse(input)
}

fn parse_number(text: &str) -> Option<HeaderValue> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(HeaderValue::Int(int));
    }
    text.replace(['D', 'd'], "E")
        .parse::<f64>()
        .ok()
        .map(HeaderValue::Real)
}

fn number_value(input: &str) -> IResult<&str, HeaderValue> {
    map_opt(
        take_while1(|c: char| c.is_ascii_digit() || "+-.EeDd".contains(c)),
        parse_number,
    )
    .parse(input)
}

/// Parse the value field of a card (the text after `= `).
pub(crate) fn card_value(input: &str) -> IResult<&str, HeaderValue> {
    preceded(space0, alt((string_value, logical_value, number_value))).parse(input)
}

/// Keyword values of one HDU header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitsHeader {
    values: HashMap<String, HeaderValue>,
}

impl FitsHeader {
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.values.get(keyword)
    }

    /// Textual value; integers are rendered, blank strings count as absent.
    pub fn get_str(&self, keyword: &str) -> Option<String> {
        match self.get(keyword)? {
            HeaderValue::Str(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            HeaderValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        match self.get(keyword)? {
            HeaderValue::Real(x) => Some(*x),
            HeaderValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn get_int(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            HeaderValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Size in bytes of the data unit following this header, padded to whole blocks.
    ///
    /// Return
    /// ----------
    /// * The padded size, or [`XtiPipeError::FitsHeader`] when `NAXIS` is out
    ///   of the `0..=999` range, an axis is negative, or the size overflows.
    fn data_size(&self, path: &Utf8Path) -> Result<u64, XtiPipeError> {
        let invalid = |reason: &str| XtiPipeError::FitsHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let naxis = self.get_int("NAXIS").unwrap_or(0);
        if !(0..=MAX_NAXIS).contains(&naxis) {
            return Err(invalid("NAXIS out of range"));
        }
        if naxis == 0 {
            return Ok(0);
        }
        let mut elements: u64 = 1;
        for n in 1..=naxis {
            let axis = u64::try_from(self.get_int(&format!("NAXIS{n}")).unwrap_or(0))
                .map_err(|_| invalid("negative axis length"))?;
            elements = elements
                .checked_mul(axis)
                .ok_or_else(|| invalid("data size overflow"))?;
        }
        let bitpix = self.get_int("BITPIX").unwrap_or(8).unsigned_abs();
        let pcount = u64::try_from(self.get_int("PCOUNT").unwrap_or(0))
            .map_err(|_| invalid("negative PCOUNT"))?;
        let gcount = u64::try_from(self.get_int("GCOUNT").unwrap_or(1))
            .map_err(|_| invalid("negative GCOUNT"))?;

        let block = BLOCK_SIZE as u64;
        pcount
            .checked_add(elements)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix))
            .map(|bits| bits / 8)
            .and_then(|bytes| bytes.div_ceil(block).checked_mul(block))
            .ok_or_else(|| invalid("data size overflow"))
    }
}

/// Primary header and first extension header of a FITS file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitsHeaders {
    pub primary: FitsHeader,
    pub extension: Option<FitsHeader>,
}

impl FitsHeaders {
    /// Read the headers of `path`, through a gzip decoder when it ends in `.gz`.
    pub fn read(path: &Utf8Path) -> Result<Self, XtiPipeError> {
        let reader = BufReader::new(File::open(path)?);
        if path.as_str().ends_with(GZ_EXTENSION) {
            Self::from_reader(GzDecoder::new(reader), path)
        } else {
            Self::from_reader(reader, path)
        }
    }

    pub fn from_reader<R: Read>(mut reader: R, path: &Utf8Path) -> Result<Self, XtiPipeError> {
        let primary = read_header(&mut reader, path)?.ok_or_else(|| XtiPipeError::FitsHeader {
            path: path.to_path_buf(),
            reason: "empty file".to_string(),
        })?;

        let data_size = primary.data_size(path)?;
        let skipped = io::copy(&mut (&mut reader).take(data_size), &mut io::sink())?;
        let extension = if skipped < data_size {
            None
        } else {
            read_header(&mut reader, path)?
        };
        Ok(FitsHeaders { primary, extension })
    }

    /// First value found for `keyword`, extension header first.
    pub fn extension_then_primary(&self, keyword: &str) -> Option<String> {
        self.extension
            .as_ref()
            .and_then(|h| h.get_str(keyword))
            .or_else(|| self.primary.get_str(keyword))
    }

    /// First value found for `keyword`, primary header first.
    pub fn primary_then_extension(&self, keyword: &str) -> Option<String> {
        self.primary
            .get_str(keyword)
            .or_else(|| self.extension.as_ref().and_then(|h| h.get_str(keyword)))
    }
}

/// Fill `buf` completely; `false` on a clean end of stream.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8], path: &Utf8Path) -> Result<bool, XtiPipeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        _ => Err(XtiPipeError::FitsHeader {
            path: path.to_path_buf(),
            reason: "truncated header block".to_string(),
        }),
    }
}

/// Read one header; `None` when the stream ends before it starts.
fn read_header<R: Read>(reader: &mut R, path: &Utf8Path) -> Result<Option<FitsHeader>, XtiPipeError> {
    let mut header = FitsHeader::default();
    let mut block = [0u8; BLOCK_SIZE];
    let mut first = true;

    loop {
        if !read_block(reader, &mut block, path)? {
            if first {
                return Ok(None);
            }
            return Err(XtiPipeError::FitsHeader {
                path: path.to_path_buf(),
                reason: "missing END card".to_string(),
            });
        }
        first = false;

        for card in block.chunks_exact(CARD_SIZE) {
            let keyword = String::from_utf8_lossy(&card[..8]).trim().to_string();
            if keyword == "END" {
                return Ok(Some(header));
            }
            if &card[8..10] != b"= " {
                continue;
            }
            let text = String::from_utf8_lossy(&card[10..]);
            if let Ok((_, value)) = card_value(&text) {
                header.values.insert(keyword, value);
            }
        }
    }
}
