use std::collections::HashSet;

/// 処理済みのリスト項目ラベルを記録する
///
/// 同じラベルの別店舗は2件目がスキップされる（既知の制限）。
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, identifier: &str) -> bool {
        !self.seen.contains(identifier)
    }

    pub fn mark_seen(&mut self, identifier: &str) {
        self.seen.insert(identifier.to_string());
    }
}
