//! 詳細ページのテキスト行を電話番号・住所・Plus Code・Webサイトに振り分ける
//!
//! 行にはラベルが付いていないため、ページ構造に合わせた単純なテキスト判定で
//! 分類する。判定順（Plus Code → 電話番号 → 住所）としきい値は変えないこと。

use super::types::{ClassifiedFields, NOT_AVAILABLE};

/// Plus Code の `+` 前後に必要な最小文字数
const LOCATION_CODE_MIN_SIDE: usize = 3;

/// 行のリストを分類する
pub fn classify<S: AsRef<str>>(blocks: &[S]) -> ClassifiedFields {
    let mut phone = None;
    let mut address = None;
    let mut location_code = None;

    for block in blocks {
        let text = block.as_ref();
        if is_location_code(text) {
            location_code = Some(text.to_string());
        } else if is_phone(text) {
            phone = Some(text.to_string());
        } else if address.is_none() {
            address = Some(text.to_string());
        }
    }

    // Webサイトは上とは独立に判定する
    let website = blocks
        .iter()
        .map(AsRef::as_ref)
        .find(|text| is_website(text))
        .unwrap_or(NOT_AVAILABLE)
        .to_string();

    ClassifiedFields {
        phone,
        address,
        location_code,
        website,
    }
}

/// 最後の `+` の後ろと最初の `+` の前がそれぞれ3文字以上
pub fn is_location_code(text: &str) -> bool {
    let (Some(first), Some(last)) = (text.find('+'), text.rfind('+')) else {
        return false;
    };
    let before = text[..first].chars().count();
    let after = text[last + 1..].chars().count();
    before >= LOCATION_CODE_MIN_SIDE && after >= LOCATION_CODE_MIN_SIDE
}

/// `+` 始まり、またはスペースを除くと数字のみ（全角数字なども数字として扱う）
pub fn is_phone(text: &str) -> bool {
    if text.starts_with('+') {
        return true;
    }
    let mut digits = text.chars().filter(|c| *c != ' ').peekable();
    digits.peek().is_some() && digits.all(is_digit)
}

/// 10進の数字（ASCII以外の `０`〜`９` や `٠`〜`٩` も含む）
fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || (c.is_numeric() && !is_fraction(c))
}

/// `½` などの分数は数字に含めない
fn is_fraction(c: char) -> bool {
    matches!(c, '\u{BC}'..='\u{BE}' | '\u{2150}'..='\u{215F}' | '\u{2189}')
}

pub fn is_website(text: &str) -> bool {
    text.starts_with("http") || text.contains('.')
}
