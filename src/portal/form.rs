//! Extraction of WebForms state from portal pages.
//!
//! Every page the portal returns embeds fresh hidden inputs (`__VIEWSTATE`,
//! `__EVENTVALIDATION`, ...) that must be echoed back on the next POST, and
//! the cascading dropdowns whose options drive the next step.

use html_scraper::{ElementRef, Html, Selector};
use indexmap::IndexMap;

use crate::portal::models::OptionEntry;

/// Hidden input name/value pairs from a single page.
///
/// Insertion-ordered; a repeated name keeps its first position but takes the
/// last value seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(IndexMap<String, String>);

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.0.shift_remove(name);
    }

    pub(crate) fn into_pairs(self) -> Vec<(String, String)> {
        self.0.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = FormFields::default();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Collect every `<input type="hidden">` that carries a name.
pub fn extract_hidden_fields(html: &Html) -> FormFields {
    let input_sel = Selector::parse("input").unwrap();
    let mut fields = FormFields::default();

    for input in html.select(&input_sel) {
        let is_hidden = input
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
        if !is_hidden {
            continue;
        }
        let name = match input.attr("name") {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        fields.insert(name, input.attr("value").unwrap_or_default());
    }

    fields
}

/// Find a `<select>` by its element id.
pub fn find_select<'a>(html: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(&format!("select#{id}")).ok()?;
    html.select(&sel).next()
}

/// Options of a dropdown, minus the leading "please choose" placeholder.
///
/// Entries missing either a value or a visible label are dropped.
pub fn extract_options(select: ElementRef<'_>) -> Vec<OptionEntry> {
    let option_sel = Selector::parse("option").unwrap();

    select
        .select(&option_sel)
        .skip(1)
        .filter_map(|option| {
            let value = option.attr("value").filter(|v| !v.is_empty())?;
            let text = option.text().collect::<String>();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(OptionEntry {
                text: text.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
