use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn enqueue_order(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    state.metrics.orders_in_queue.inc();

    if let Err(err) = state.order_tx.send(order_id).await {
        state.metrics.orders_in_queue.dec();
        return Err(AppError::Internal(format!("order queue send failed: {err}")));
    }

    Ok(())
}
