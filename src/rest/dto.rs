//! Shared wire shapes used across more than one resource router (spec
//! §6.1's pagination envelope, the scheduled-task/session query strings).

use serde::{Deserialize, Serialize};

use crate::repository::{Page, Pagination};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub project_id: Option<String>,
}

fn default_page_number() -> u32 {
    1
}
fn default_page_size() -> u32 {
    20
}

impl PageQuery {
    pub fn normalize(&self) -> Result<Pagination, crate::error::GatewayError> {
        Pagination::normalize(self.page_number, self.page_size)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub project_id: Option<String>,
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
    pub next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PageEnvelope<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T: Serialize> PageEnvelope<T> {
    pub fn from_page<U>(page: Page<U>, pagination: Pagination, map: impl Fn(U) -> T) -> Self {
        let total_pages = page.total_pages(pagination.page_size);
        let next_page = if (pagination.page_number as u64) < total_pages {
            Some(pagination.page_number + 1)
        } else {
            None
        };
        Self {
            data: page.data.into_iter().map(map).collect(),
            meta: PageMeta {
                page_number: pagination.page_number,
                page_size: pagination.page_size,
                total_count: page.total_count,
                total_pages,
                next_page,
            },
        }
    }
}
