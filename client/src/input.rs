//! Line-based console input and output

use crate::network::{ClientError, Result};
use crate::rendering;
use shared::is_valid_code;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

/// Answer to a two-option menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    First,
    Second,
}

impl MenuChoice {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "1" => Some(MenuChoice::First),
            "2" => Some(MenuChoice::Second),
            _ => None,
        }
    }
}

/// Reads answers from `R` and prints prompts and game events to `W`.
pub struct Terminal<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    pub async fn say(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    /// Asks until the user types 1 or 2.
    pub async fn choice(&mut self) -> Result<MenuChoice> {
        loop {
            let line = self.next_line().await?;
            if let Some(choice) = MenuChoice::parse(&line) {
                return Ok(choice);
            }
            self.say(rendering::INVALID_CHOICE).await?;
        }
    }

    /// Prints `prompt` and asks until the user types four digits.
    pub async fn digits(&mut self, prompt: &str) -> Result<String> {
        self.say(prompt).await?;
        loop {
            let line = self.next_line().await?;
            let code = line.trim();
            if is_valid_code(code.as_bytes()) {
                return Ok(code.to_string());
            }
            self.say(rendering::INVALID_CODE).await?;
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    async fn next_line(&mut self) -> Result<String> {
        self.lines
            .next_line()
            .await?
            .ok_or(ClientError::InputClosed)
    }
}
