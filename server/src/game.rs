use shared::CODE_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Result of scoring one guess against a secret code.
pub struct Score {
    /// Digits matching the code in the same position
    pub bulls: usize,
    /// Digit pairs matching the code in another position
    pub cows: usize,
}

impl Score {
    /// True when every position of the code was guessed.
    pub fn is_solved(&self) -> bool {
        self.bulls == CODE_LEN
    }
}

/// Scores `guess` against the secret `code`.
///
/// Every matching pair of digits counts once: as a bull when the positions are
/// equal, as a cow otherwise. Repeated digits are not deduplicated.
pub fn score(code: &[u8], guess: &[u8]) -> Score {
    let mut result = Score::default();
    for (i, secret) in code.iter().enumerate() {
        for (j, guessed) in guess.iter().enumerate() {
            if secret != guessed {
                continue;
            }
            if i == j {
                result.bulls += 1;
            } else {
                result.cows += 1;
            }
        }
    }
    result
}

/// Outcome of one guess round from the point of view of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue(Score),
    Won,
    Lost,
    Draw,
}

/// `mine` scores my guess against the opponent's code, `theirs` scores the
/// opponent's guess against mine.
pub fn judge(mine: Score, theirs: Score) -> Verdict {
    match (mine.is_solved(), theirs.is_solved()) {
        (true, true) => Verdict::Draw,
        (true, false) => Verdict::Won,
        (false, true) => Verdict::Lost,
        (false, false) => Verdict::Continue(mine),
    }
}
