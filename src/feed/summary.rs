// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

/// Turn an HTML episode description into normalized plain text
///
/// All markup is removed, entities are decoded, runs of whitespace collapse
/// to a single space and the result is NFKD-normalized. Returns `None` when
/// nothing readable is left.
pub fn clean_summary(html: &str) -> Option<String> {
    let stripped = ammonia::Builder::default()
        .tags(HashSet::new())
        .clean(html)
        .to_string();

    let decoded = html_escape::decode_html_entities(&stripped);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized: String = collapsed.nfkd().collect();

    Some(normalized).filter(|s| !s.is_empty())
}
