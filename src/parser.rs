//! 詳細ページHTMLの解析
//!
//! `scraper::Html` は `Send` ではないので、ここの関数は全て同期的に
//! 完結させ、`.await` をまたいで保持しない。

use scraper::{ElementRef, Html, Selector};

use crate::config::Selectors;
use crate::error::ScraperError;
use crate::listing::RawDetailBlocks;

pub fn parse(markup: &str) -> Html {
    Html::parse_document(markup)
}

/// セレクタに一致する要素のテキスト（子孫のテキストを連結し、両端だけtrim）
pub fn select_all(doc: &Html, selector: &str) -> Result<Vec<String>, ScraperError> {
    let selector = compile(selector)?;
    Ok(doc.select(&selector).map(stripped_text).collect())
}

/// 詳細ページから見出しと連絡先の行を取り出す
pub fn extract_detail(markup: &str, selectors: &Selectors) -> Result<RawDetailBlocks, ScraperError> {
    let doc = parse(markup);

    let detail_name = select_all(&doc, &selectors.detail_name)?
        .into_iter()
        .find(|name| !name.is_empty());

    // 空の行は情報を持たないので落とす
    let blocks = select_all(&doc, &selectors.fact_rows)?
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect();

    Ok(RawDetailBlocks {
        detail_name,
        blocks,
    })
}

fn compile(selector: &str) -> Result<Selector, ScraperError> {
    Selector::parse(selector)
        .map_err(|e| ScraperError::Parse(format!("invalid selector '{}': {:?}", selector, e)))
}

fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
