use html_scraper::{ElementRef, Html, Selector};

/// Title element of the provider's limit banner.
const LIMIT_TITLE_SELECTOR: &str = ".shl_info_title";
/// Description block of the provider's limit banner.
const LIMIT_DESC_SELECTOR: &str = ".shl_desc";

const LIMIT_TITLE_PHRASE: &str = "wow, you do love kagi";
const LIMIT_DESC_PHRASES: [&str; 2] = [
    "you have used your included 300 searches for this billing period",
    "searches will be paused until your subscription renews",
];

fn element_text_lc(el: &ElementRef) -> String {
    el.text().collect::<String>().to_lowercase()
}

/// Element-scoped signature checks, short-circuiting on first match.
///
/// Deliberately no full-page text scan: this runs on every mutation batch,
/// so traversal stays bounded to two selector lookups.
fn subtree_matches(doc: &Html) -> bool {
    let Ok(title_sel) = Selector::parse(LIMIT_TITLE_SELECTOR) else {
        return false;
    };
    if let Some(el) = doc.select(&title_sel).next() {
        if element_text_lc(&el).contains(LIMIT_TITLE_PHRASE) {
            return true;
        }
    }

    let Ok(desc_sel) = Selector::parse(LIMIT_DESC_SELECTOR) else {
        return false;
    };
    if let Some(el) = doc.select(&desc_sel).next() {
        let txt = element_text_lc(&el);
        if LIMIT_DESC_PHRASES.iter().any(|p| txt.contains(p)) {
            return true;
        }
    }

    false
}

/// Whole-document form, used at the content-loaded milestone.
pub fn document_looks_like_limit_page(html: &str) -> bool {
    subtree_matches(&Html::parse_document(html))
}

/// Fragment form, used per added element node during the mutation watch.
pub fn fragment_looks_like_limit_page(html: &str) -> bool {
    subtree_matches(&Html::parse_fragment(html))
}
