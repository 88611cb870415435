use crate::{
    data::student::Window,
    error::{EscolaResult, InvalidPageSnafu},
};
use axum::http::Uri;
use serde::Serialize;
use snafu::{OptionExt, ensure};

pub const MAX_PAGE_SIZE: u64 = 100;
pub const PAGE_PARAM: &str = "page";

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u64,
    pub size: u64,
}

impl PageRequest {
    /// Works out which page was asked for. `Ok(None)` means pagination is off, which is the case
    /// when there's neither a configured default nor a usable `page_size`.
    pub fn from_params(
        page: Option<&str>,
        page_size: Option<&str>,
        default_size: Option<u64>,
    ) -> EscolaResult<Option<Self>> {
        let size = page_size
            .and_then(|size| size.trim().parse::<u64>().ok())
            .or(default_size);
        let Some(size) = size else {
            return Ok(None);
        };

        let number = match page.map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|number| *number > 0)
                .context(InvalidPageSnafu { page: raw })?,
        };

        Ok(Some(Self {
            number,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }))
    }

    pub const fn window(self) -> Window {
        Window {
            offset: (self.number - 1).saturating_mul(self.size),
            limit: self.size,
        }
    }

    pub const fn page_count(self, count: u64) -> u64 {
        if count == 0 { 1 } else { count.div_ceil(self.size) }
    }

    /// Wraps one page of results, failing if the page lies past the end.
    pub fn envelope<T>(self, uri: &Uri, count: u64, results: Vec<T>) -> EscolaResult<Paginated<T>> {
        let last = self.page_count(count);
        ensure!(
            self.number <= last,
            InvalidPageSnafu {
                page: self.number.to_string()
            }
        );

        Ok(Paginated {
            count,
            next: (self.number < last).then(|| page_link(uri, self.number + 1)),
            previous: (self.number > 1).then(|| page_link(uri, self.number - 1)),
            results,
        })
    }
}

/// Same path and query, with `page` swapped out. The first page is linked without a `page` param.
fn page_link(uri: &Uri, page: u64) -> String {
    let page_pair = format!("{PAGE_PARAM}={page}");
    let mut pairs: Vec<&str> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(PAGE_PARAM))
        .collect();
    if page > 1 {
        pairs.push(&page_pair);
    }

    if pairs.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), pairs.join("&"))
    }
}
