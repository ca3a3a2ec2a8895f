use tokio::{sync::watch, task::JoinHandle};
use tracing::error;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

pub fn trigger(sender: &ShutdownSender) {
    let _ = sender.send(true);
}

pub fn is_triggered(receiver: &ShutdownReceiver) -> bool {
    *receiver.borrow()
}

pub async fn wait(mut receiver: ShutdownReceiver) {
    if *receiver.borrow() {
        return;
    }

    while receiver.changed().await.is_ok() {
        if *receiver.borrow() {
            break;
        }
    }
}

/// Triggers `sender` on ctrl-c. Abort the handle once the service is done.
pub fn spawn_ctrl_c(sender: ShutdownSender, service_name: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, service = service_name, "unable to listen for ctrl_c");
        }
        trigger(&sender);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_once_triggered() {
        let (tx, rx) = channel();
        assert!(!is_triggered(&rx));

        let waiter = tokio::spawn(wait(rx.clone()));
        trigger(&tx);

        waiter.await.expect("join");
        assert!(is_triggered(&rx));
    }

    #[tokio::test]
    async fn wait_on_already_triggered_returns_immediately() {
        let (tx, rx) = channel();
        trigger(&tx);
        wait(rx).await;
    }
}
