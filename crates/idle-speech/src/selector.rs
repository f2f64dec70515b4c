use crate::IdleUtterance;
use companion_context::{IdlePhrase, IdlePlaybackMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks the next line from the user's phrase list.
pub struct PhraseSelector {
    cursor: usize,
    last_id: Option<String>,
    rng: StdRng,
}

impl PhraseSelector {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            cursor: 0,
            last_id: None,
            rng,
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last_id = None;
    }

    /// Sequential mode walks the list by `order`, wrapping at the end. Random
    /// mode draws uniformly but never repeats the previous phrase when there is
    /// more than one to choose from.
    pub fn next(&mut self, phrases: &[IdlePhrase], mode: IdlePlaybackMode) -> Option<IdleUtterance> {
        if phrases.is_empty() {
            return None;
        }

        let mut sorted: Vec<&IdlePhrase> = phrases.iter().collect();
        sorted.sort_by_key(|p| p.order);

        let idx = match mode {
            IdlePlaybackMode::Sequential => {
                if self.cursor >= sorted.len() {
                    self.cursor = 0;
                }
                let idx = self.cursor;
                self.cursor = (self.cursor + 1) % sorted.len();
                idx
            }
            IdlePlaybackMode::Random => self.draw(&sorted),
        };

        let phrase = sorted[idx];
        self.last_id = Some(phrase.id.clone());
        Some(IdleUtterance::new(phrase.text.clone(), phrase.emotion))
    }

    fn draw(&mut self, sorted: &[&IdlePhrase]) -> usize {
        let previous = self
            .last_id
            .as_deref()
            .and_then(|id| sorted.iter().position(|p| p.id == id));

        match previous {
            Some(prev) if sorted.len() > 1 => {
                // draw from the other n-1 slots
                let idx = self.rng.gen_range(0..sorted.len() - 1);
                if idx >= prev {
                    idx + 1
                } else {
                    idx
                }
            }
            _ => self.rng.gen_range(0..sorted.len()),
        }
    }
}

impl Default for PhraseSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_context::Emotion;
    use std::collections::HashMap;

    fn phrase(id: &str, text: &str, order: i32) -> IdlePhrase {
        IdlePhrase {
            id: id.to_string(),
            text: text.to_string(),
            emotion: Emotion::Neutral,
            order,
        }
    }

    #[test]
    fn test_sequential_follows_order_and_wraps() {
        let phrases = vec![phrase("b", "B", 1), phrase("a", "A", 0)];
        let mut sel = PhraseSelector::with_seed(1);
        let texts: Vec<String> = (0..3)
            .map(|_| sel.next(&phrases, IdlePlaybackMode::Sequential).unwrap().text)
            .collect();
        assert_eq!(texts, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_sequential_visits_each_phrase_once_per_cycle() {
        let phrases: Vec<IdlePhrase> = (0..7)
            .rev()
            .map(|i| phrase(&format!("p{i}"), &format!("line {i}"), i))
            .collect();
        let mut sel = PhraseSelector::with_seed(2);
        for _cycle in 0..3 {
            let seen: Vec<String> = (0..7)
                .map(|_| sel.next(&phrases, IdlePlaybackMode::Sequential).unwrap().text)
                .collect();
            let expected: Vec<String> = (0..7).map(|i| format!("line {i}")).collect();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_sequential_survives_shrinking_list() {
        let mut phrases = vec![phrase("a", "A", 0), phrase("b", "B", 1), phrase("c", "C", 2)];
        let mut sel = PhraseSelector::with_seed(3);
        sel.next(&phrases, IdlePlaybackMode::Sequential);
        sel.next(&phrases, IdlePlaybackMode::Sequential);
        phrases.truncate(1);
        let next = sel.next(&phrases, IdlePlaybackMode::Sequential).unwrap();
        assert_eq!(next.text, "A");
    }

    #[test]
    fn test_random_never_repeats_back_to_back() {
        for n in 2..6 {
            let phrases: Vec<IdlePhrase> = (0..n)
                .map(|i| phrase(&format!("p{i}"), &format!("line {i}"), i))
                .collect();
            for seed in 0..20 {
                let mut sel = PhraseSelector::with_seed(seed);
                let mut prev = sel.next(&phrases, IdlePlaybackMode::Random).unwrap().text;
                for _ in 0..200 {
                    let cur = sel.next(&phrases, IdlePlaybackMode::Random).unwrap().text;
                    assert_ne!(cur, prev, "n={n} seed={seed}");
                    prev = cur;
                }
            }
        }
    }

    #[test]
    fn test_random_reaches_every_phrase() {
        let phrases: Vec<IdlePhrase> = (0..4)
            .map(|i| phrase(&format!("p{i}"), &format!("line {i}"), i))
            .collect();
        let mut sel = PhraseSelector::with_seed(42);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..400 {
            let u = sel.next(&phrases, IdlePlaybackMode::Random).unwrap();
            *counts.entry(u.text).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c > 50));
    }

    #[test]
    fn test_single_phrase_repeats_in_random_mode() {
        let phrases = vec![phrase("only", "Only", 0)];
        let mut sel = PhraseSelector::with_seed(5);
        for _ in 0..5 {
            assert_eq!(sel.next(&phrases, IdlePlaybackMode::Random).unwrap().text, "Only");
        }
    }

    #[test]
    fn test_empty_list_yields_nothing() {
        let mut sel = PhraseSelector::with_seed(0);
        assert!(sel.next(&[], IdlePlaybackMode::Sequential).is_none());
        assert!(sel.next(&[], IdlePlaybackMode::Random).is_none());
    }
}
