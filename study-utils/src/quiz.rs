//! Quiz scoring rules shared by the mini-games.

/// One graded answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Correct,
    Incorrect,
}

/// Running score for one quiz attempt. A correct answer is worth +1, an
/// incorrect one -1, and the score never drops below zero. The attempt is
/// won the first time the running score reaches `target`.
#[derive(Clone, Debug)]
pub struct QuizSession {
    target: u32,
    score: u32,
    answered: u32,
    won: bool,
}

impl QuizSession {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            score: 0,
            answered: 0,
            won: false,
        }
    }

    /// Records one answer. Returns true exactly once: on the answer that
    /// first pushes the running score up to the target.
    pub fn record(&mut self, answer: Answer) -> bool {
        self.answered += 1;
        match answer {
            Answer::Correct => self.score += 1,
            Answer::Incorrect => self.score = self.score.saturating_sub(1),
        }
        if !self.won && self.score >= self.target {
            self.won = true;
            return true;
        }
        false
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn answered(&self) -> u32 {
        self.answered
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn is_won(&self) -> bool {
        self.won
    }
}
