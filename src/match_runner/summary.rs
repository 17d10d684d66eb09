//! Extraction of the match result from the tournament program's output.
//!
//! Tournament programs print a running tally while games finish, so the output usually
//! holds many summary lines. The last one is the final result; an earlier line with bigger
//! numbers is never preferred.

use crate::{error::TunerError, objective::MatchOutcome};

/// Summary line layouts understood by [`SummaryFormat::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFormat {
    /// `T1000,b10000,433 - 54 - 503(46.26% R-26.03) ...`: engine 1 (the candidate) wins,
    /// draws, engine 2 wins.
    #[default]
    Coliseum,
    /// `GameResult 12 - 3 - 17`: counted from the reference engine, i.e. the candidate's
    /// losses, draws, wins.
    GameServer,
}

impl SummaryFormat {
    /// Outcome of the last summary line found in `output`.
    pub fn parse(&self, output: &str) -> Result<MatchOutcome, TunerError> {
        output
            .lines()
            .rev()
            .find_map(|line| self.parse_line(line))
            .ok_or_else(|| TunerError::Parse(format!("no {self:?} summary line in match output")))
    }

    fn parse_line(&self, line: &str) -> Option<MatchOutcome> {
        match self {
            SummaryFormat::Coliseum => {
                let line = line.trim_start();
                let rest = line.strip_prefix('T')?;
                let (time, rest) = rest.split_once(',')?;
                let (budget, rest) = rest.split_once(',')?;
                time.parse::<u64>().ok()?;
                budget.strip_prefix('b')?.parse::<u64>().ok()?;
                let (wins, draws, losses) = parse_triple(rest)?;
                Some(MatchOutcome::new(wins, draws, losses))
            }
            SummaryFormat::GameServer => {
                let (_, rest) = line.split_once("GameResult ")?;
                let (losses, draws, wins) = parse_triple(rest)?;
                Some(MatchOutcome::new(wins, draws, losses))
            }
        }
    }
}

impl std::str::FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coliseum" => Ok(SummaryFormat::Coliseum),
            "game-server" | "gameserver" => Ok(SummaryFormat::GameServer),
            _ => Err(format!("unknown summary format '{s}'")),
        }
    }
}

/// Parses the leading `<a> - <b> - <c>` of `s`; anything after the third number is ignored.
fn parse_triple(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.splitn(3, '-');
    let a = parts.next()?.trim().parse().ok()?;
    let b = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let c = rest[..digits].parse().ok()?;
    Some((a, b, c))
}
