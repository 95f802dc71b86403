use std::io;

use crate::source::{Item, POR_NONE, Source};

/// Deterministic record generator: the same sequence on every run, so a
/// position (count of records emitted) can be replayed from scratch.
pub trait Generate {
    fn initial(&mut self) -> Vec<u8>;
    /// Next record given the previous one, or `None` to end the sequence.
    fn apply(&mut self, last: &[u8]) -> Option<Vec<u8>>;
}

/// Source over a [`Generate`] impl. The position is the number of records
/// emitted so far.
pub struct GenSource<G> {
    generator: G,
    name: Vec<u8>,
    key: Vec<u8>,
    last: Option<Vec<u8>>,
    count: u64,
    done: bool,
}

impl<G: Generate> GenSource<G> {
    pub fn new(name: impl Into<Vec<u8>>, generator: G) -> Self {
        let name = name.into();
        Self { generator, key: name.clone(), name, last: None, count: 0, done: false }
    }
}

impl<G: Generate> Source for GenSource<G> {
    fn name(&self) -> &[u8] {
        &self.name
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn point_of_ref(&self) -> u64 {
        self.count
    }

    fn reset(&mut self, por: u64) -> io::Result<()> {
        let target = if por == POR_NONE { 0 } else { por };
        self.last = None;
        self.count = 0;
        self.done = false;
        // Replay the deterministic prefix up to the target position.
        while self.count < target {
            match self.next()? {
                Item::Record { .. } => {}
                _ => break,
            }
        }
        Ok(())
    }

    fn next(&mut self) -> io::Result<Item> {
        if self.done {
            return Ok(Item::End);
        }
        let value = match self.last.clone() {
            None => self.generator.initial(),
            Some(prev) => match self.generator.apply(&prev) {
                Some(value) => value,
                None => {
                    self.done = true;
                    return Ok(Item::End);
                }
            },
        };
        self.last = Some(value.clone());
        self.count += 1;
        Ok(Item::Record { payload: value, por: self.count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts upward from 0, ending after `max` records.
    struct Counter {
        max: u64,
    }

    impl Generate for Counter {
        fn initial(&mut self) -> Vec<u8> {
            b"0".to_vec()
        }

        fn apply(&mut self, last: &[u8]) -> Option<Vec<u8>> {
            let last: u64 = std::str::from_utf8(last).unwrap().parse().unwrap();
            if last + 1 >= self.max {
                return None;
            }
            Some((last + 1).to_string().into_bytes())
        }
    }

    #[test]
    fn test_positions_count_emitted_records() {
        let mut source = GenSource::new("counter", Counter { max: 3 });
        assert_eq!(
            source.next().unwrap(),
            Item::Record { payload: b"0".to_vec(), por: 1 }
        );
        assert_eq!(
            source.next().unwrap(),
            Item::Record { payload: b"1".to_vec(), por: 2 }
        );
        assert_eq!(
            source.next().unwrap(),
            Item::Record { payload: b"2".to_vec(), por: 3 }
        );
        assert_eq!(source.next().unwrap(), Item::End);
    }

    #[test]
    fn test_reset_replays_the_prefix() {
        let mut source = GenSource::new("counter", Counter { max: 5 });
        for _ in 0..4 {
            source.next().unwrap();
        }
        source.reset(2).unwrap();
        assert_eq!(source.point_of_ref(), 2);
        assert_eq!(
            source.next().unwrap(),
            Item::Record { payload: b"2".to_vec(), por: 3 }
        );
    }

    #[test]
    fn test_reset_to_sentinel_starts_over() {
        let mut source = GenSource::new("counter", Counter { max: 2 });
        source.next().unwrap();
        source.reset(POR_NONE).unwrap();
        assert_eq!(
            source.next().unwrap(),
            Item::Record { payload: b"0".to_vec(), por: 1 }
        );
    }
}
