//! Named tokens on the user-data page.

use super::{FlashError, UserDataPage, ERASED, PAGE_SIZE, WORD_SIZE};

/// Token access error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum TokenError {
    /// No token with that name in the layout.
    UnknownToken,
    /// The value length differs from the token size.
    SizeMismatch { expected: u32, actual: u32 },
    /// Programming would need a 0 bit to become 1.
    NeedsErase,
    /// Two tokens of the layout share bytes.
    Overlap,
    /// Underlying flash access failed.
    Flash(FlashError),
}

impl From<FlashError> for TokenError {
    fn from(error: FlashError) -> Self {
        TokenError::Flash(error)
    }
}

impl core::fmt::Display for TokenError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenError::UnknownToken => f.write_str("unknown token"),
            TokenError::SizeMismatch { expected, actual } => {
                write!(f, "token is {expected} bytes, value is {actual}")
            }
            TokenError::NeedsErase => f.write_str("value needs the page erased first"),
            TokenError::Overlap => f.write_str("tokens overlap"),
            TokenError::Flash(error) => write!(f, "flash: {error}"),
        }
    }
}

impl core::error::Error for TokenError {}

/// One token: a named byte range of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct TokenDef {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

impl TokenDef {
    pub fn new(name: impl Into<String>, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }

    fn range(&self) -> core::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }
}

/// Token layout of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TokenLayout {
    pub tokens: Vec<TokenDef>,
}

impl Default for TokenLayout {
    /// The manufacturing tokens.
    fn default() -> Self {
        Self {
            tokens: vec![
                TokenDef::new("MFG_CUSTOM_VERSION", 0x000, 2),
                TokenDef::new("MFG_CUSTOM_EUI_64", 0x002, 8),
                TokenDef::new("MFG_STRING", 0x00a, 16),
                TokenDef::new("MFG_BOARD_NAME", 0x01a, 16),
                TokenDef::new("MFG_MANUF_ID", 0x02a, 2),
                TokenDef::new("MFG_PHY_CONFIG", 0x02c, 2),
                TokenDef::new("MFG_CTUNE", 0x100, 2),
                TokenDef::new("MFG_INSTALLATION_CODE", 0x270, 20),
            ],
        }
    }
}

impl TokenLayout {
    pub fn find(&self, name: &str) -> Option<&TokenDef> {
        self.tokens.iter().find(|token| token.name == name)
    }

    /// Every token fits the page and no two overlap.
    pub fn validate(&self) -> Result<(), TokenError> {
        let mut ranges: Vec<_> = self.tokens.iter().map(TokenDef::range).collect();
        if ranges.iter().any(|range| range.end > PAGE_SIZE) {
            return Err(TokenError::Flash(FlashError::OutOfBounds));
        }
        ranges.sort_by_key(|range| range.start);
        if ranges.windows(2).any(|pair| pair[0].end > pair[1].start) {
            return Err(TokenError::Overlap);
        }
        Ok(())
    }
}

/// Reads and programs tokens of a page by name.
pub struct TokenStore<'a> {
    page: &'a UserDataPage,
    layout: &'a TokenLayout,
}

impl<'a> TokenStore<'a> {
    pub fn new(page: &'a UserDataPage, layout: &'a TokenLayout) -> Self {
        Self { page, layout }
    }

    pub fn layout(&self) -> &TokenLayout {
        self.layout
    }

    fn token(&self, name: &str) -> Result<&'a TokenDef, TokenError> {
        self.layout.find(name).ok_or(TokenError::UnknownToken)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, TokenError> {
        let token = self.token(name)?;
        let mut value = vec![0; token.size as usize];
        self.page.read_bytes(token.offset, &mut value)?;
        Ok(value)
    }

    /// Whether every byte of the token still reads as erased.
    pub fn is_erased(&self, name: &str) -> Result<bool, TokenError> {
        Ok(self.read(name)?.iter().all(|byte| *byte == ERASED))
    }

    /// Program `value` into the token.
    ///
    /// Bytes sharing a flash word with the token are left as they are.
    pub fn write(&self, name: &str, value: &[u8]) -> Result<(), TokenError> {
        let token = self.token(name)?;
        if value.len() != token.size as usize {
            return Err(TokenError::SizeMismatch {
                expected: token.size,
                actual: value.len() as u32,
            });
        }
        let current = self.read(name)?;
        if current.iter().zip(value).any(|(stored, new)| stored & new != *new) {
            return Err(TokenError::NeedsErase);
        }

        let start = token.offset as usize / WORD_SIZE * WORD_SIZE;
        let end = (token.range().end).div_ceil(WORD_SIZE) * WORD_SIZE;
        let mut words = vec![ERASED; end - start];
        let lead = token.offset as usize - start;
        words[lead..lead + value.len()].copy_from_slice(value);
        self.page.program(start as u32, &words)?;

        debug!("token {}: programmed {} bytes", token.name.as_str(), value.len());
        Ok(())
    }
}
