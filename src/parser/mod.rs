pub mod mapping;
pub mod properties;

use scraper::Html;
use serde::Serialize;

use crate::db::PlantRecord;
use crate::utils::subject_name;
use properties::PropertyBag;

#[derive(Debug, Serialize)]
pub struct PageData {
    pub source: String,
    pub properties: PropertyBag,
    pub record: PlantRecord,
}

/// Two-stage pipeline: HTML → property bag → plant record.
pub fn process_page(html: &str, source: &str) -> PageData {
    let doc = Html::parse_document(html);
    let properties = properties::extract(&doc, &subject_name(source));
    let record = mapping::map(&properties, source);
    PageData {
        source: source.to_string(),
        properties,
        record,
    }
}
