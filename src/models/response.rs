use serde::{Deserialize, Serialize};

/// 只含分页参数的查询串
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// 分页请求，page 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, page_size: Option<usize>, default_size: usize, max_size: usize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_size.max(1)),
        }
    }

    /// 超大页码时饱和，不会溢出
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }
}

/// 分页结果结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Paginated<T> {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, count: usize, page: PageRequest) -> Self {
        let total_pages = if count == 0 {
            0
        } else {
            (count + page.page_size - 1) / page.page_size
        };
        Self {
            count,
            page: page.page,
            page_size: page.page_size,
            total_pages,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        let page = PageRequest::new(Some(0), Some(500), 10, 100);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(page.offset(), 0);

        let page = PageRequest::new(Some(3), None, 10, 100);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn test_offset_saturates_on_huge_page() {
        let page = PageRequest::new(Some(usize::MAX), Some(50), 10, 100);
        assert_eq!(page.page, usize::MAX);
        assert_eq!(page.offset(), usize::MAX);

        let page = PageRequest::new(Some(usize::MAX / 2), Some(100), 10, 100);
        assert_eq!(page.offset(), usize::MAX);
    }

    #[test]
    fn test_total_pages() {
        let page = PageRequest::new(Some(1), Some(10), 10, 100);
        assert_eq!(Paginated::<u8>::new(vec![], 0, page).total_pages, 0);
        assert_eq!(Paginated::<u8>::new(vec![], 10, page).total_pages, 1);
        assert_eq!(Paginated::<u8>::new(vec![], 11, page).total_pages, 2);
    }
}
