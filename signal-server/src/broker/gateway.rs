//! Broker session management.
//!
//! Sessions are one-per-(login, server); all requests against the same
//! session are serialized behind its lock. The engine and synchronizer
//! share sessions through the gateway.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    AccountInfo, BrokerApi, BrokerResult, ClosedPosition, DealRecord, LimitOrderRequest,
    MarketOrderRequest, ModifiedPosition, OpenPosition, OrderFill, OrderPlacement, Quote,
};

/// Creates raw terminal bindings. The production connector spawns one
/// terminal binding per session; tests inject doubles here.
pub trait BrokerConnector: Send + Sync {
    fn create(&self) -> Arc<dyn BrokerApi>;
}

/// One live terminal session. Requests are serialized by the inner lock.
pub struct BrokerSession {
    api: Arc<dyn BrokerApi>,
    lock: Mutex<()>,
    login: i64,
    server: String,
}

impl BrokerSession {
    pub fn login(&self) -> i64 {
        self.login
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn market_order(&self, request: MarketOrderRequest) -> BrokerResult<OrderFill> {
        let _guard = self.lock.lock().await;
        self.api.market_order(request).await
    }

    pub async fn limit_order(&self, request: LimitOrderRequest) -> BrokerResult<OrderPlacement> {
        let _guard = self.lock.lock().await;
        self.api.limit_order(request).await
    }

    pub async fn close_position(&self, symbol: &str, ticket: i64) -> BrokerResult<ClosedPosition> {
        let _guard = self.lock.lock().await;
        self.api.close_position(symbol, ticket).await
    }

    pub async fn modify_position(
        &self,
        ticket: i64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> BrokerResult<ModifiedPosition> {
        let _guard = self.lock.lock().await;
        self.api.modify_position(ticket, stop_loss, take_profit).await
    }

    pub async fn quote(&self, symbol: &str) -> Option<Quote> {
        let _guard = self.lock.lock().await;
        self.api.quote(symbol).await
    }

    pub async fn list_positions(&self, symbol: Option<&str>) -> Vec<OpenPosition> {
        let _guard = self.lock.lock().await;
        self.api.list_positions(symbol).await
    }

    pub async fn history_deal(&self, ticket: i64) -> Option<DealRecord> {
        let _guard = self.lock.lock().await;
        self.api.history_deal(ticket).await
    }

    pub async fn account_info(&self) -> BrokerResult<AccountInfo> {
        let _guard = self.lock.lock().await;
        self.api.account_info().await
    }
}

pub struct BrokerGateway {
    connector: Arc<dyn BrokerConnector>,
    sessions: Mutex<HashMap<(i64, String), Arc<BrokerSession>>>,
}

impl BrokerGateway {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open or reuse the session for (login, server). Connect is
    /// idempotent on the underlying terminal, so reused sessions are
    /// re-bound on every call.
    pub async fn session(
        &self,
        login: i64,
        password: &str,
        server: &str,
    ) -> BrokerResult<Arc<BrokerSession>> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry((login, server.to_string()))
                .or_insert_with(|| {
                    Arc::new(BrokerSession {
                        api: self.connector.create(),
                        lock: Mutex::new(()),
                        login,
                        server: server.to_string(),
                    })
                })
                .clone()
        };

        {
            let _guard = session.lock.lock().await;
            session.api.connect(login, password, server).await?;
        }

        Ok(session)
    }

    /// Disconnect and drop every live session.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Arc<BrokerSession>> = {
            let mut map = self.sessions.lock().await;
            map.drain().map(|(_, session)| session).collect()
        };

        for session in sessions {
            let _guard = session.lock.lock().await;
            session.api.disconnect().await;
            tracing::info!(
                "Disconnected broker session {}@{}",
                session.login,
                session.server
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingApi {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl BrokerApi for CountingApi {
        async fn connect(&self, _login: i64, _password: &str, _server: &str) -> BrokerResult<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn market_order(&self, _request: MarketOrderRequest) -> BrokerResult<OrderFill> {
            Err(DomainError::broker("not implemented", None))
        }

        async fn limit_order(&self, _request: LimitOrderRequest) -> BrokerResult<OrderPlacement> {
            Err(DomainError::broker("not implemented", None))
        }

        async fn close_position(
            &self,
            _symbol: &str,
            _ticket: i64,
        ) -> BrokerResult<ClosedPosition> {
            Err(DomainError::broker("not implemented", None))
        }

        async fn modify_position(
            &self,
            _ticket: i64,
            _stop_loss: Option<Decimal>,
            _take_profit: Option<Decimal>,
        ) -> BrokerResult<ModifiedPosition> {
            Err(DomainError::broker("not implemented", None))
        }

        async fn quote(&self, _symbol: &str) -> Option<Quote> {
            None
        }

        async fn list_positions(&self, _symbol: Option<&str>) -> Vec<OpenPosition> {
            vec![]
        }

        async fn history_deal(&self, _ticket: i64) -> Option<DealRecord> {
            None
        }

        async fn account_info(&self) -> BrokerResult<AccountInfo> {
            Err(DomainError::broker("not implemented", None))
        }
    }

    struct CountingConnector {
        created: AtomicUsize,
    }

    impl BrokerConnector for CountingConnector {
        fn create(&self) -> Arc<dyn BrokerApi> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingApi {
                connects: AtomicUsize::new(0),
            })
        }
    }

    #[tokio::test]
    async fn test_session_reuse_per_login_server() {
        let connector = Arc::new(CountingConnector {
            created: AtomicUsize::new(0),
        });
        let gateway = BrokerGateway::new(connector.clone());

        let a = gateway.session(101, "pw", "Broker-Demo").await.unwrap();
        let b = gateway.session(101, "pw", "Broker-Demo").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.created.load(Ordering::SeqCst), 1);

        let _c = gateway.session(102, "pw", "Broker-Demo").await.unwrap();
        assert_eq!(connector.created.load(Ordering::SeqCst), 2);

        let _d = gateway.session(101, "pw", "Broker-Live").await.unwrap();
        assert_eq!(connector.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_all_clears_sessions() {
        let connector = Arc::new(CountingConnector {
            created: AtomicUsize::new(0),
        });
        let gateway = BrokerGateway::new(connector.clone());

        gateway.session(101, "pw", "Broker-Demo").await.unwrap();
        gateway.disconnect_all().await;

        gateway.session(101, "pw", "Broker-Demo").await.unwrap();
        assert_eq!(connector.created.load(Ordering::SeqCst), 2);
    }
}
