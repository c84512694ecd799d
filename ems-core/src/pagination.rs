use crate::esi_client::EsiPage;
use anyhow::Result;
use futures::stream::{self, Stream, TryStreamExt};
use std::any::type_name;
use std::future::Future;
use tracing::{event, trace_span, Instrument, Level};

/// Lazily walks an ESI listing one page at a time, starting at page 1.
///
/// Every response's page count is read afresh: the sequence ends once the current page reaches
/// it, after `max_pages` pages (0 means no cap), or at the first empty page. A response without
/// a page count ends the sequence after that page. Calling `paginate` again restarts from page 1.
pub fn paginate<T, F, Fut>(max_pages: u32, fetch_page: F) -> impl Stream<Item = Result<Vec<T>>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<EsiPage<T>>>,
{
    let output_parameter_type_name = type_name::<T>();

    stream::try_unfold((Some(1u32), fetch_page), move |(maybe_page, mut fetch_page)| async move {
        let Some(page) = maybe_page else {
            return Ok(None);
        };

        let response = fetch_page(page).await?;
        if response.data.is_empty() {
            event!(Level::TRACE, "Page {} of {} is empty, stopping", page, output_parameter_type_name);
            return Ok(None);
        }

        let total_number_of_pages = response.total_pages.unwrap_or(page);
        event!(Level::TRACE, "Downloaded page {} of {} ({})", page, total_number_of_pages, output_parameter_type_name);

        let reached_cap = max_pages > 0 && page >= max_pages;
        let next_page = if reached_cap || page >= total_number_of_pages { None } else { Some(page + 1) };

        Ok(Some((response.data, (next_page, fetch_page))))
    })
}

/// Drains [`paginate`] into one vector.
pub async fn fetch_all_pages<T, F, Fut>(max_pages: u32, fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<EsiPage<T>>>,
{
    let span = trace_span!("pagination");

    async move {
        event!(Level::TRACE, "Start downloading all pages of type {}", type_name::<T>());
        let all_data: Vec<T> = paginate(max_pages, fetch_page).try_concat().await?;
        event!(Level::TRACE, "Done downloading {} entries", all_data.len());
        Ok(all_data)
    }
    .instrument(span)
    .await
}
