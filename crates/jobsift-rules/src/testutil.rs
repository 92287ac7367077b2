use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use jobsift_core::{JobPosting, Modality, SALARY_NOT_SPECIFIED};

pub fn posting(id: &str, title: &str, description: &str) -> JobPosting {
    let instant = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
    JobPosting {
        id: id.to_string(),
        title: title.to_string(),
        company: String::new(),
        description: description.to_string(),
        source: "test".to_string(),
        salary: SALARY_NOT_SPECIFIED.to_string(),
        url: format!("https://jobs.example/{id}"),
        published_at: instant,
        published_at_estimated: false,
        date_scraped: instant,
        tags: BTreeMap::new(),
        modality: Modality::NotSpecified,
        score: None,
        score_details: None,
    }
}
