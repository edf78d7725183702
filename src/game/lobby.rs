//! Pre-match theme voting

use super::theme::Theme;

/// A participant's theme preference
#[derive(Debug, Clone)]
pub struct ThemeVote {
    pub player_id: String,
    pub display_name: String,
    pub theme: Theme,
}

/// Theme preferences in submission order
#[derive(Debug, Default)]
pub struct ThemeVotes {
    votes: Vec<ThemeVote>,
}

impl ThemeVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. A repeat vote changes the theme but keeps the
    /// participant's original position.
    pub fn submit(&mut self, player_id: &str, display_name: &str, theme: Theme) {
        match self.votes.iter_mut().find(|v| v.player_id == player_id) {
            Some(vote) => vote.theme = theme,
            None => self.votes.push(ThemeVote {
                player_id: player_id.to_string(),
                display_name: display_name.to_string(),
                theme,
            }),
        }
    }

    /// Drop a departed participant's vote
    pub fn withdraw(&mut self, player_id: &str) -> bool {
        let before = self.votes.len();
        self.votes.retain(|v| v.player_id != player_id);
        self.votes.len() != before
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// (name, theme) pairs for the selections broadcast
    pub fn selections(&self) -> Vec<(String, Theme)> {
        self.votes
            .iter()
            .map(|v| (v.display_name.clone(), v.theme))
            .collect()
    }

    /// Every connected participant has voted and there are enough of them
    pub fn is_unanimous_turnout(&self, participants: usize, min_players: usize) -> bool {
        participants >= min_players && self.votes.len() == participants
    }

    /// Most voted theme. Ties go to the theme that was submitted first.
    pub fn winner(&self) -> Option<Theme> {
        let mut tally: Vec<(Theme, usize)> = Vec::new();
        for vote in &self.votes {
            match tally.iter_mut().find(|(theme, _)| *theme == vote.theme) {
                Some((_, count)) => *count += 1,
                None => tally.push((vote.theme, 1)),
            }
        }

        let mut best: Option<(Theme, usize)> = None;
        for (theme, count) in tally {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((theme, count));
            }
        }
        best.map(|(theme, _)| theme)
    }
}
