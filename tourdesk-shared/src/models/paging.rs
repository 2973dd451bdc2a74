use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 100;

/// `?page=&per_page=` query parameters. Out-of-range values are clamped, not rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.per_page() as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, request: &PageRequest) -> Self {
        Self {
            data,
            total,
            page: request.page(),
            per_page: request.per_page(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let req = PageRequest::default();
        assert_eq!(req.page(), 1);
        assert_eq!(req.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest { page: Some(0), per_page: Some(1000) };
        assert_eq!(req.page(), 1);
        assert_eq!(req.per_page(), MAX_PER_PAGE);
    }

    #[test]
    fn offset_follows_page() {
        let req = PageRequest { page: Some(3), per_page: Some(10) };
        assert_eq!(req.offset(), 20);
        assert_eq!(req.limit(), 10);
    }
}
