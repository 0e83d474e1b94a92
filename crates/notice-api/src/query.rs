use serde::Deserialize;

use notice_db::models::{PageRequest, RecipientFilter};
use notice_types::api::Page;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

/// `GET /posts/{id}/recipients` query string.
#[derive(Debug, Deserialize)]
pub struct RecipientQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub email: Option<String>,
    pub student_number: Option<String>,
}

impl RecipientQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }

    pub fn filter(&self) -> RecipientFilter {
        RecipientFilter {
            email: self.email.clone(),
            student_number: self.student_number.clone(),
        }
    }
}

/// Wrap one page of items with the clamped paging that produced it.
pub fn page_of<T>(items: Vec<T>, request: PageRequest, total: u64) -> Page<T> {
    Page {
        items,
        page: request.page,
        per_page: request.per_page,
        total,
    }
}
