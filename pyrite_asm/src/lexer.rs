//! Tokeniser for score source text, plus file and folder ingestion.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::token::{lookup_keyword, Token, TokenKind};

/// Static assets consumed elsewhere; their sources are not part of a score.
const SKIPPED_SOURCES: [&str; 2] = ["drumkits.asm", "wave_samples.asm"];

#[derive(Debug)]
pub enum LexError {
    /// The operation involved file I/O which failed, providing the underlying io::Error
    Io(io::Error),
    /// The source text could not be tokenised
    Syntax { line: usize, message: String },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LexError::Io(ref e) => write!(f, "I/O Error: {}", e),
            LexError::Syntax { line, ref message } => {
                write!(f, "Syntax error at line {}: {}", line, message)
            }
        }
    }
}

impl From<io::Error> for LexError {
    fn from(e: io::Error) -> Self {
        LexError::Io(e)
    }
}

/// Accumulates tokens across any number of source files. Files lexed in
/// sequence share one token stream, exactly as if concatenated.
#[derive(Default)]
pub struct Lexer {
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new() -> Self {
        Lexer { tokens: Vec::new() }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokenises one source string into the stream.
    pub fn lex_source(&mut self, source: &str) -> Result<(), LexError> {
        let chars: Vec<char> = source.chars().collect();
        let mut index = 0;
        let mut line = 1;
        let mut comment = false;

        while index < chars.len() {
            let c = chars[index];
            index += 1;

            if c == '\n' {
                line += 1;
                comment = false;
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            if comment {
                continue;
            }
            if c == ';' {
                comment = true;
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' || c == '.' {
                let start = index - 1;
                while index < chars.len()
                    && (chars[index].is_ascii_alphanumeric()
                        || matches!(chars[index], '_' | '#' | '.'))
                {
                    index += 1;
                }
                let lexeme: String = chars[start..index].iter().collect();
                match lookup_keyword(&lexeme.to_lowercase()) {
                    Some(keyword) => self.tokens.push(keyword),
                    None => self.tokens.push(Token {
                        lexeme,
                        kind: TokenKind::Identifier,
                        size: 0,
                    }),
                }
            } else if c.is_ascii_digit() || c == '-' {
                let start = index - 1;
                while index < chars.len() && chars[index].is_ascii_digit() {
                    index += 1;
                }
                self.tokens.push(Token {
                    lexeme: chars[start..index].iter().collect(),
                    kind: TokenKind::Integer,
                    size: 0,
                });
            } else if c == '$' {
                // A '$' with no digits after it is an empty hex literal and
                // reads back as zero.
                let start = index;
                while index < chars.len() && chars[index].is_ascii_hexdigit() {
                    index += 1;
                }
                self.tokens.push(Token {
                    lexeme: chars[start..index].iter().collect(),
                    kind: TokenKind::Hexadecimal,
                    size: 0,
                });
            } else {
                let kind = match c {
                    ':' => TokenKind::Colon,
                    ',' => TokenKind::Comma,
                    _ => {
                        return Err(LexError::Syntax {
                            line,
                            message: format!("unexpected character '{}'", c),
                        })
                    }
                };
                self.tokens.push(Token {
                    lexeme: c.to_string(),
                    kind,
                    size: 0,
                });
            }
        }

        Ok(())
    }

    /// Lexes one source file, skipping the static-asset sources.
    pub fn lex_file(&mut self, path: impl AsRef<Path>) -> Result<(), LexError> {
        let path = path.as_ref();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if SKIPPED_SOURCES.contains(&name) {
                debug!("Skipping static asset source '{}'.", name);
                return Ok(());
            }
        }

        let source = fs::read_to_string(path)?;
        self.lex_source(&source).map_err(|e| match e {
            LexError::Syntax { line, message } => LexError::Syntax {
                line,
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Lexes every regular file directly inside the folder, in name order.
    pub fn lex_folder(&mut self, path: impl AsRef<Path>) -> Result<(), LexError> {
        for entry in WalkDir::new(path.as_ref())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                io::Error::new(io::ErrorKind::Other, e.to_string())
            })?;
            if entry.file_type().is_file() {
                self.lex_file(entry.path())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod lexer_tests {
    use super::*;

    #[test]
    fn tokenises_labels_commands_and_literals() {
        let mut lexer = Lexer::new();
        lexer
            .lex_source("Song: channel_count 1 ; a comment\n.loop:\n  note c#, 4\n  dw $1A2B\n")
            .unwrap();

        let kinds: Vec<TokenKind> = lexer.tokens().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Command(0xC0),
                TokenKind::Integer,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Command(0xC2),
                TokenKind::Note(2),
                TokenKind::Comma,
                TokenKind::Integer,
                TokenKind::Data(super::super::token::DataWidth::Word),
                TokenKind::Hexadecimal,
            ]
        );
        assert_eq!(lexer.tokens()[4].lexeme, ".loop");
        assert_eq!(lexer.tokens()[11].lexeme, "1A2B");
    }

    #[test]
    fn keywords_are_case_insensitive_identifiers_are_not() {
        let mut lexer = Lexer::new();
        lexer.lex_source("SOUND_RET MySong").unwrap();
        assert_eq!(lexer.tokens()[0].kind, TokenKind::Command(0xFF));
        assert_eq!(lexer.tokens()[1].lexeme, "MySong");
    }

    #[test]
    fn negative_integers() {
        let mut lexer = Lexer::new();
        lexer.lex_source("square_note 16, 10, -3, 1762").unwrap();
        assert_eq!(lexer.tokens()[3].signed_integer(), -3);
    }

    #[test]
    fn rejects_garbage() {
        let mut lexer = Lexer::new();
        assert!(matches!(
            lexer.lex_source("note @"),
            Err(LexError::Syntax { line: 1, .. })
        ));
    }

    #[test]
    fn bare_hex_prefix_reads_as_zero() {
        let mut lexer = Lexer::new();
        lexer.lex_source("db $\ndb $10").unwrap();
        assert_eq!(lexer.tokens()[1].kind, TokenKind::Hexadecimal);
        assert_eq!(lexer.tokens()[1].lexeme, "");
        assert_eq!(lexer.tokens()[1].integer(), 0);
        assert_eq!(lexer.tokens()[3].integer(), 0x10);
    }
}
