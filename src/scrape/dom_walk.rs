//! DOM-walk extraction: the legacy fallback for console builds that only
//! render markup.
//!
//! The list item itself shows nothing useful; each device has to be
//! clicked open, read from its detail panel, and closed again. The panel
//! carries no coordinates, so records from this path have none.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use tracing::debug;

use crate::config::WaitBudgets;
use crate::device::{RawDeviceEntry, RawSnapshot};
use crate::driver::{eval_json, wait_until};
use crate::error::ClientResult;

use super::{ExtractionStrategy, DEVICE_LIST_CONTAINER};

const LIST_ITEMS: &str = "#device-list .device-list ul > li";
const DETAIL_PANEL: &str = "div.panel-wrap > div.device-detail";
const BACK_BUTTON: &str = "div.panel-wrap > div.device-detail div.handle-header-left > i.back";

pub struct DomWalkStrategy {
    waits: WaitBudgets,
}

impl DomWalkStrategy {
    pub fn new(waits: WaitBudgets) -> Self {
        Self { waits }
    }

    /// Whether the list has finished refreshing: loading overlay hidden,
    /// no "正在更新" markers, and every item either located or settled
    /// into an error state.
    async fn list_ready(&self, page: &Page) -> ClientResult<bool> {
        let script = format!(
            "(() => {{
                const overlay = document.querySelector('div.device_location');
                if (overlay && getComputedStyle(overlay).display !== 'none') return false;
                const spans = Array.from(document.querySelectorAll('span'));
                if (spans.some((s) => s.textContent.trim() === '正在更新')) return false;
                const items = Array.from(document.querySelectorAll({items}));
                if (items.length === 0) return false;
                return items.every((item) =>
                    item.querySelector('.device-poi') ||
                    item.querySelector('.device-status-wrap:not(.positioning)'));
            }})()",
            items = serde_json::to_string(LIST_ITEMS)?,
        );
        eval_json(page, &script).await
    }

    /// Open item `index`, read its detail panel, and navigate back.
    async fn read_item(&self, page: &Page, index: usize) -> ClientResult<RawDeviceEntry> {
        let open = format!(
            "(() => {{
                const items = document.querySelectorAll({items});
                const item = items[{index}];
                if (!item) return false;
                item.click();
                return true;
            }})()",
            items = serde_json::to_string(LIST_ITEMS)?,
        );
        wait_until(
            "opening a device detail panel",
            self.waits.interactive,
            self.waits.poll,
            || {
                let open = open.clone();
                async move {
                    let clicked: bool = eval_json(page, &open).await?;
                    Ok(if clicked { Some(()) } else { None })
                }
            },
        )
        .await?;

        let read = format!(
            "(() => {{
                const panel = document.querySelector({panel});
                if (!panel) return null;
                const name = panel.querySelector('.device-name span:last-child');
                const marker = panel.querySelector('.device-name .device-dian');
                const address = panel.querySelector('.device-address');
                const battery = panel.querySelector('.device-battery .num');
                return {{
                    deviceName: name ? name.textContent.trim() : null,
                    locationStatus:
                        marker && (marker.className || '').includes('online') ? 'online' : 'offline',
                    poi: address ? address.textContent.trim() : null,
                    battery: battery ? battery.textContent.trim() : null,
                }};
            }})()",
            panel = serde_json::to_string(DETAIL_PANEL)?,
        );
        let entry = wait_until(
            "reading a device detail panel",
            self.waits.interactive,
            self.waits.poll,
            || {
                let read = read.clone();
                async move { eval_json::<Option<RawDeviceEntry>>(page, &read).await }
            },
        )
        .await?;

        let back = format!(
            "(() => {{
                const back = document.querySelector({back});
                if (!back) return false;
                back.click();
                return true;
            }})()",
            back = serde_json::to_string(BACK_BUTTON)?,
        );
        wait_until(
            "returning to the device list",
            self.waits.interactive,
            self.waits.poll,
            || {
                let back = back.clone();
                async move {
                    let clicked: bool = eval_json(page, &back).await?;
                    Ok(if clicked { Some(()) } else { None })
                }
            },
        )
        .await?;

        Ok(entry)
    }
}

#[async_trait]
impl ExtractionStrategy for DomWalkStrategy {
    fn name(&self) -> &'static str {
        "dom-walk"
    }

    async fn probe(&self, page: &Page) -> ClientResult<bool> {
        let script = format!(
            "!!document.querySelector({})",
            serde_json::to_string(DEVICE_LIST_CONTAINER)?
        );
        eval_json(page, &script).await
    }

    async fn try_extract(&self, page: &Page) -> ClientResult<Option<RawSnapshot>> {
        if !self.list_ready(page).await? {
            return Ok(None);
        }

        let count: usize = eval_json(
            page,
            &format!(
                "document.querySelectorAll({}).length",
                serde_json::to_string(LIST_ITEMS)?
            ),
        )
        .await?;
        debug!(count, "walking rendered device list");

        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            entries.push(self.read_item(page, index).await?);
        }

        // The legacy markup never exposes coordinates.
        Ok(Some(RawSnapshot {
            device_list: entries,
            points: Vec::new(),
        }))
    }
}
