//! State-object extraction: read the device list straight out of the
//! console application's in-page store.

use async_trait::async_trait;
use chromiumoxide::page::Page;

use crate::device::RawSnapshot;
use crate::driver::eval_json;
use crate::error::{ClientError, ClientResult};

use super::ExtractionStrategy;

/// JS path to the find-module state, valid only while the console build
/// keeps exposing its store on the root instance.
pub(crate) const STATE_ROOT: &str =
    "(window.$nuxt && window.$nuxt.$store && window.$nuxt.$store.state.find)";

pub struct StateObjectStrategy;

#[async_trait]
impl ExtractionStrategy for StateObjectStrategy {
    fn name(&self) -> &'static str {
        "state-object"
    }

    async fn probe(&self, page: &Page) -> ClientResult<bool> {
        eval_json(page, &format!("!!{STATE_ROOT}")).await
    }

    async fn try_extract(&self, page: &Page) -> ClientResult<Option<RawSnapshot>> {
        // One atomic evaluation: the list and its parallel points array
        // are snapshotted together, so positional pairing cannot tear.
        let script = format!(
            "(() => {{
                const state = {STATE_ROOT};
                if (!state || !Array.isArray(state.deviceList) || state.deviceList.length === 0) {{
                    return null;
                }}
                return JSON.parse(JSON.stringify({{
                    deviceList: state.deviceList,
                    points: state.points || [],
                }}));
            }})()"
        );
        eval_json(page, &script).await
    }

    async fn settle_timeout(&self, page: &Page) -> ClientResult<Option<RawSnapshot>> {
        let script = format!(
            "(() => {{
                const state = {STATE_ROOT};
                if (!state || !Array.isArray(state.deviceList)) return 'absent';
                return state.deviceList.length === 0 ? 'empty' : 'pending';
            }})()"
        );
        let verdict: String = eval_json(page, &script).await?;
        match verdict.as_str() {
            // An account with no devices is a success, not a failure.
            "empty" => Ok(Some(RawSnapshot::default())),
            "absent" => Err(ClientError::Authentication("session expired".into())),
            _ => Ok(None),
        }
    }
}
