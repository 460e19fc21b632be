//! Dedup table: `origin_name -> bounded FIFO of last 100 observed msg_seq`
//! (SPEC_FULL.md §3, §4.C `check_message`). Not thread-safe by design — it
//! is only ever touched from the single-consumer processor FIFO (§5).

use std::collections::{HashMap, VecDeque};

const HISTORY_LEN: usize = 100;

#[derive(Debug, Default)]
pub struct DedupTable {
    seen: HashMap<String, VecDeque<u64>>,
}

impl DedupTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `(orig, msg_num)` was already observed (i.e. the
    /// caller should drop the message). Otherwise records it and returns
    /// `false`. A message with `msg_num == None` (client-originated) is
    /// never deduped and always returns `false`.
    pub fn check_and_record(&mut self, orig: &str, msg_num: Option<u64>) -> bool {
        let Some(seq) = msg_num else {
            return false;
        };
        let history = self.seen.entry(orig.to_string()).or_default();
        if history.contains(&seq) {
            return true;
        }
        history.push_back(seq);
        if history.len() > HISTORY_LEN {
            history.pop_front();
        }
        false
    }
}
