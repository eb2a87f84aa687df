//! Header tokenizer shared by the PGM and PFM readers.

use std::{io::BufRead, str::FromStr};

use crate::error::{ForensicsError, Result};

fn peek(input: &mut dyn BufRead) -> Result<Option<u8>> {
    Ok(input.fill_buf()?.first().copied())
}

/// Skips whitespace and `#` comments running to the end of the line.
pub(super) fn skip_separators(input: &mut dyn BufRead) -> Result<()> {
    let mut in_comment = false;
    while let Some(byte) = peek(input)? {
        match byte {
            b'\n' | b'\r' if in_comment => in_comment = false,
            _ if in_comment => {}
            b'#' => in_comment = true,
            b if b.is_ascii_whitespace() => {}
            _ => break,
        }
        input.consume(1);
    }
    Ok(())
}

/// Skips trailing whitespace and reports whether the input is exhausted.
pub(super) fn at_end(input: &mut dyn BufRead) -> Result<bool> {
    while let Some(byte) = peek(input)? {
        if !byte.is_ascii_whitespace() {
            return Ok(false);
        }
        input.consume(1);
    }
    Ok(true)
}

/// Reads the two-byte magic number, e.g. `P5`.
pub(super) fn magic(input: &mut dyn BufRead) -> Result<[u8; 2]> {
    let mut magic = [0u8; 2];
    super::read_exact(input, &mut magic, "magic number")?;
    Ok(magic)
}

fn token(input: &mut dyn BufRead) -> Result<String> {
    skip_separators(input)?;
    let mut token = Vec::new();
    while let Some(byte) = peek(input)? {
        if byte.is_ascii_whitespace() || byte == b'#' || token.len() >= 64 {
            break;
        }
        token.push(byte);
        input.consume(1);
    }
    if token.is_empty() {
        return Err(ForensicsError::invalid_image("truncated header"));
    }
    Ok(String::from_utf8_lossy(&token).into_owned())
}

pub(super) fn field<T: FromStr>(input: &mut dyn BufRead, name: &str) -> Result<T> {
    let token = token(input)?;
    token
        .parse()
        .map_err(|_| ForensicsError::invalid_image(format!("bad {} {:?} in header", name, token)))
}

/// Consumes the single whitespace byte that separates the header from the
/// raster.
pub(super) fn end_of_header(input: &mut dyn BufRead) -> Result<()> {
    match peek(input)? {
        Some(byte) if byte.is_ascii_whitespace() => {
            input.consume(1);
            Ok(())
        }
        _ => Err(ForensicsError::invalid_image("missing whitespace after header")),
    }
}

pub(super) fn dimensions(input: &mut dyn BufRead) -> Result<(usize, usize)> {
    let width = field::<usize>(input, "width")?;
    let height = field::<usize>(input, "height")?;
    if width == 0 || height == 0 {
        return Err(ForensicsError::invalid_image(format!(
            "image dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    Ok((width, height))
}
