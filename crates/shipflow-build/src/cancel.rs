//! 実行の中断シグナル
//!
//! `tokio::sync::watch` で中断要求を全ての待機箇所へ伝えます。

use tokio::sync::watch;

/// 中断を要求する側
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // 受信側が全て破棄されていても問題ない
        let _ = self.tx.send(true);
    }
}

/// 中断を待つ側。クローンして複数箇所で待てます。
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn pair() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx })
    }

    /// 中断されない Cancellation
    pub fn never() -> Cancellation {
        let (handle, cancellation) = Self::pair();
        // 送信側を破棄しても最後の値 (false) は読める
        drop(handle);
        cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// 中断されるまで待つ。送信側が中断せずに破棄された場合は永久に待つ
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, cancellation) = Cancellation::pair();
        let waiter = tokio::spawn({
            let cancellation = cancellation.clone();
            async move { cancellation.cancelled().await }
        });

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake up")
            .unwrap();
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_does_not_complete() {
        let cancellation = Cancellation::never();
        let result =
            tokio::time::timeout(Duration::from_millis(20), cancellation.cancelled()).await;
        assert!(result.is_err());
        assert!(!cancellation.is_cancelled());
    }
}
