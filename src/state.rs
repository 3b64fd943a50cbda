use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::engine::assignment::{DispatchSettings, Dispatcher};
use crate::engine::mission::MissionControl;
use crate::observability::metrics::Metrics;
use crate::store::Stores;

pub struct AppState {
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: Dispatcher,
    pub mission_control: MissionControl,
    pub order_tx: mpsc::Sender<Uuid>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
        order_queue_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (order_tx, order_rx) = mpsc::channel(order_queue_size.max(1));
        let metrics = Metrics::new();

        (
            Self {
                dispatcher: Dispatcher::new(
                    stores.clone(),
                    clock.clone(),
                    metrics.clone(),
                    settings,
                ),
                mission_control: MissionControl::new(
                    stores.clone(),
                    clock.clone(),
                    metrics.clone(),
                ),
                stores,
                clock,
                order_tx,
                metrics,
            },
            order_rx,
        )
    }

    /// In-memory stores and the system clock.
    pub fn in_memory(
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        Self::new(
            Stores::in_memory(event_buffer_size),
            Arc::new(SystemClock),
            DispatchSettings::default(),
            order_queue_size,
        )
    }
}
