//! 結果の書き込み先

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScraperError;
use crate::listing::BusinessRecord;
use crate::traits::ResultSink;

/// CSVへの書き込み方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// これまでの全レコードで毎回ファイルを作り直す
    #[default]
    Rewrite,
    /// 行を追記する（ヘッダは空ファイルのときだけ）
    Append,
}

/// ローカルCSVファイル
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    mode: SinkMode,
    written: Vec<BusinessRecord>,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>, mode: SinkMode) -> Self {
        Self {
            path: path.into(),
            mode,
            written: Vec::new(),
        }
    }

    /// `{dir}/{query}_results.csv`
    pub fn for_query(dir: impl AsRef<Path>, query: &str, mode: SinkMode) -> Self {
        Self::new(dir.as_ref().join(results_file_name(query)), mode)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), ScraperError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn rewrite(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError> {
        let mut all = self.written.clone();
        all.extend_from_slice(records);

        let mut writer = csv::Writer::from_path(&self.path)?;
        for record in &all {
            writer.serialize(record)?;
        }
        writer.flush()?;

        self.written = all;
        Ok(())
    }

    fn append_rows(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for CsvFileSink {
    async fn append(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError> {
        let result = self.ensure_parent().and_then(|()| match self.mode {
            SinkMode::Rewrite => self.rewrite(records),
            SinkMode::Append => self.append_rows(records),
        });
        result.map_err(|e| ScraperError::SinkWrite {
            pending: records.len(),
            message: format!("{}: {}", self.path.display(), e),
        })?;
        debug!("Wrote {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// メモリ上に溜めるだけ
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<BusinessRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[BusinessRecord] {
        &self.records
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn append(&mut self, records: &[BusinessRecord]) -> Result<(), ScraperError> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}

/// クエリからファイル名を作る（パス区切りは `_` に置き換え）
pub fn results_file_name(query: &str) -> String {
    let safe: String = query
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    format!("{}_results.csv", safe)
}
