//! Home screen tiles - which of the launcher apps are shown.

use crate::{
    errors::Result,
    storage::{KeyValueStore, load_json, persist_or_log, save_json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const HOME_APPS_KEY: &str = "yasasuma_homeApps";

/// Launcher apps, in home screen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeApp {
    /// Dial pad and favorite contacts
    Phone,
    /// Day view of events
    Calendar,
    /// Destinations and directions
    Map,
    /// Camera capture
    Camera,
    /// Photo library
    Photos,
}

impl HomeApp {
    /// All apps in display order
    pub const ALL: [Self; 5] = [
        Self::Phone,
        Self::Calendar,
        Self::Map,
        Self::Camera,
        Self::Photos,
    ];
}

/// Visibility flag per app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeApps {
    phone: bool,
    calendar: bool,
    map: bool,
    camera: bool,
    photos: bool,
}

impl Default for HomeApps {
    fn default() -> Self {
        Self {
            phone: true,
            calendar: true,
            map: true,
            camera: false,
            photos: false,
        }
    }
}

impl HomeApps {
    /// Reads stored flags; absent flags take their defaults.
    pub async fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        Ok(load_json(store, HOME_APPS_KEY).await?.unwrap_or_default())
    }

    /// Whether `app` is shown
    #[must_use]
    pub const fn is_visible(&self, app: HomeApp) -> bool {
        match app {
            HomeApp::Phone => self.phone,
            HomeApp::Calendar => self.calendar,
            HomeApp::Map => self.map,
            HomeApp::Camera => self.camera,
            HomeApp::Photos => self.photos,
        }
    }

    /// Shown apps in display order
    #[must_use]
    pub fn visible(&self) -> Vec<HomeApp> {
        HomeApp::ALL
            .into_iter()
            .filter(|app| self.is_visible(*app))
            .collect()
    }

    /// Shows or hides `app` and persists the flags.
    pub async fn set<S: KeyValueStore>(&mut self, store: &S, app: HomeApp, visible: bool) {
        let flag = match app {
            HomeApp::Phone => &mut self.phone,
            HomeApp::Calendar => &mut self.calendar,
            HomeApp::Map => &mut self.map,
            HomeApp::Camera => &mut self.camera,
            HomeApp::Photos => &mut self.photos,
        };
        *flag = visible;
        debug!("Home app {:?} visible={}", app, visible);
        persist_or_log(HOME_APPS_KEY, save_json(store, HOME_APPS_KEY, &*self)).await;
    }
}
