//! Browser rendering: page URL in, PDF artefact out.
//!
//! The safety envelope around every render:
//!
//! - script execution disabled before navigation,
//! - `DNT: 1` on all requests,
//! - Fetch-domain interception aborting every resource type that is not
//!   part of the visual document (no XHR, no media, no scripts),
//! - a hard navigation deadline,
//! - the size cap applied to the produced PDF.

use crate::error::FetchError;
use cecibot_types::FileInfo;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetEmulatedMediaParams, SetScriptExecutionDisabledParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, Headers, ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Extra height added to the PDF page so content ending exactly at the fold
/// does not spill into a trailing blank page.
const PDF_HEIGHT_PADDING_PX: f64 = 32.0;

/// Height used when the `scrollHeight` probe fails (driver execution-context
/// race, see `document_height`).
const FALLBACK_HEIGHT_PX: f64 = 1920.0;

/// Quiet period after the load event before the page is considered settled.
const SETTLE_AFTER_LOAD: Duration = Duration::from_millis(500);

/// CSS pixels per inch; `Page.printToPdf` takes paper sizes in inches.
const PX_PER_INCH: f64 = 96.0;

/// Render settings, from the worker configuration.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Hard deadline for navigation, including the settle period.
    pub navigation_timeout: Duration,
    /// PDF page width in CSS pixels.
    pub page_width_px: u32,
}

/// Navigates a fresh page to `url` and prints it to a PDF under
/// `download_path`, enforcing `max_file_size`.
///
/// # Errors
///
/// `Timeout` and `Navigation` for the expected ways a page fails to load,
/// `TooBig` when the PDF breaches the cap, `Browser`/`Io` (surfaced to the
/// user as `internal error`) for everything else.
pub async fn render_page(
    browser: &Browser,
    options: &RenderOptions,
    url: &str,
    download_path: &Path,
    max_file_size: u64,
) -> Result<FileInfo, FetchError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(FetchError::Browser)?;

    let result = render_on(&page, options, url, download_path, max_file_size).await;

    if let Err(e) = page.close().await {
        tracing::warn!(error = %e, "failed to close page");
    }

    result
}

async fn render_on(
    page: &Page,
    options: &RenderOptions,
    url: &str,
    download_path: &Path,
    max_file_size: u64,
) -> Result<FileInfo, FetchError> {
    page.execute(SetScriptExecutionDisabledParams::new(true))
        .await
        .map_err(FetchError::Browser)?;

    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
        json!({"DNT": "1"}),
    )))
    .await
    .map_err(FetchError::Browser)?;

    intercept_requests(page).await?;

    navigate(page, url, options.navigation_timeout).await?;

    let height_px = document_height(page).await;

    page.execute(SetEmulatedMediaParams {
        media: Some("screen".to_string()),
        ..Default::default()
    })
    .await
    .map_err(FetchError::Browser)?;

    let pdf = page
        .pdf(PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(f64::from(options.page_width_px) / PX_PER_INCH),
            paper_height: Some((height_px + PDF_HEIGHT_PADDING_PX) / PX_PER_INCH),
            ..Default::default()
        })
        .await
        .map_err(FetchError::Browser)?;

    let path = download_path.join(format!("{}.pdf", Uuid::new_v4()));
    tokio::fs::write(&path, &pdf).await.map_err(FetchError::Io)?;

    let size = pdf.len() as u64;
    if size > max_file_size {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(FetchError::TooBig {
            size,
            max: max_file_size,
        });
    }

    let title = match page.get_title().await {
        Ok(Some(title)) => title,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read page title");
            String::new()
        }
    };

    Ok(FileInfo {
        title,
        path,
        extension: ".pdf".to_string(),
        mime: "application/pdf".to_string(),
        size,
    })
}

/// Turns on Fetch-domain interception and spawns the verdict task: resource
/// types belonging to the visual document continue, everything else is
/// aborted before it leaves the browser.
async fn intercept_requests(page: &Page) -> Result<(), FetchError> {
    page.execute(FetchEnableParams::default())
        .await
        .map_err(FetchError::Browser)?;

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(FetchError::Browser)?;

    let verdict_page = page.clone();
    tokio::spawn(async move {
        // The stream ends when the page closes, which also ends this task.
        while let Some(event) = paused.next().await {
            let request_id = event.request_id.clone();
            let result = if is_visual_resource(&event.resource_type) {
                verdict_page
                    .execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            } else {
                verdict_page
                    .execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = result {
                tracing::debug!(error = %e, "interception verdict not delivered");
            }
        }
    });

    Ok(())
}

fn is_visual_resource(resource_type: &ResourceType) -> bool {
    matches!(
        resource_type,
        ResourceType::Document
            | ResourceType::Stylesheet
            | ResourceType::Image
            | ResourceType::Font
    )
}

/// Drives the page to `url` under one hard deadline covering the load event
/// and the settle period.
async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), FetchError> {
    let navigation = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        tokio::time::sleep(SETTLE_AFTER_LOAD).await;
        Ok::<(), chromiumoxide::error::CdpError>(())
    };

    match tokio::time::timeout(timeout, navigation).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(FetchError::Navigation(e.to_string())),
        Err(_) => Err(FetchError::Timeout),
    }
}

/// The document's full scroll height in CSS pixels.
///
/// The evaluation can fail with the driver's "cannot find context with
/// specified id" when the page swaps execution contexts at the wrong moment;
/// that is recoverable, so a fixed fallback height is used instead of
/// failing the render.
async fn document_height(page: &Page) -> f64 {
    match page.evaluate("document.documentElement.scrollHeight").await {
        Ok(result) => match result.into_value::<f64>() {
            Ok(height) => height,
            Err(e) => {
                tracing::warn!(error = %e, "scrollHeight was not a number, using fallback");
                FALLBACK_HEIGHT_PX
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "scrollHeight evaluation failed, using fallback");
            FALLBACK_HEIGHT_PX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visual_resources_pass_the_filter() {
        assert!(is_visual_resource(&ResourceType::Document));
        assert!(is_visual_resource(&ResourceType::Stylesheet));
        assert!(is_visual_resource(&ResourceType::Image));
        assert!(is_visual_resource(&ResourceType::Font));
    }

    #[test]
    fn non_visual_resources_are_aborted() {
        assert!(!is_visual_resource(&ResourceType::Script));
        assert!(!is_visual_resource(&ResourceType::Xhr));
        assert!(!is_visual_resource(&ResourceType::Fetch));
        assert!(!is_visual_resource(&ResourceType::Media));
        assert!(!is_visual_resource(&ResourceType::WebSocket));
        assert!(!is_visual_resource(&ResourceType::Other));
    }
}
