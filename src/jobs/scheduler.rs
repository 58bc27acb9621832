use tokio_cron_scheduler::{JobScheduler, Job};
use std::sync::Arc;
use tracing::{info, error};
use crate::AppState;

pub async fn start_scheduler(state: Arc<AppState>) {
    let sched = JobScheduler::new().await.expect("Failed to create scheduler");

    // Renew push subscriptions nearing expiry every six hours; a lapsed watch
    // silently stops notifications
    let state_clone = Arc::clone(&state);
    let watch_renewal_job = Job::new_async("0 0 */6 * * *", move |_, _| {
        let state = state_clone.clone();
        Box::pin(async move {
            info!("Running scheduled Gmail watch renewal...");
            let renewed = state.watch_manager.renew_expiring_watches().await;
            info!("Watch renewal finished, {} watches re-registered", renewed);
        })
    }).expect("Failed to create watch renewal job");

    sched.add(watch_renewal_job).await.expect("Failed to add watch renewal job to scheduler");

    // Daily fallback sweep to catch replies the push pipeline missed
    let state_clone = Arc::clone(&state);
    let fallback_sweep_job = Job::new_async("0 30 4 * * *", move |_, _| {
        let state = state_clone.clone();
        Box::pin(async move {
            info!("Running scheduled fallback reply sweep...");

            let integrations = match state.integration_repository.list_active_gmail_integrations() {
                Ok(integrations) => integrations,
                Err(e) => {
                    error!("Failed to list integrations for fallback sweep: {}", e);
                    return;
                }
            };

            for integration in integrations {
                match state.fallback_scanner.scan(&integration, None).await {
                    Ok(outcomes) => {
                        let found = outcomes.iter().filter(|o| o.reply_found).count();
                        if found > 0 {
                            info!(
                                "Fallback sweep found {} replies for integration {}",
                                found,
                                integration.id
                            );
                        }
                    }
                    Err(e) => {
                        error!("Fallback sweep failed for integration {}: {}", integration.id, e);
                    }
                }
            }
        })
    }).expect("Failed to create fallback sweep job");

    sched.add(fallback_sweep_job).await.expect("Failed to add fallback sweep job to scheduler");

    // Start the scheduler
    sched.start().await.expect("Failed to start scheduler");
}
