//! # Mock Container
//!
//! `MockContainer` hands out a real [`ContainerClient`] whose requests are
//! answered from a queue of expectations instead of a running container. Use it
//! to test code that *consumes* the container (directories, facades, request
//! handlers) without building and starting services.
//!
//! Expectations are matched in order. A request that does not match the next
//! expectation panics the responder task, which surfaces in the test as
//! [`ContainerError::ActorDropped`] or [`ContainerError::ActorClosed`].
//!
//! ```rust
//! use std::sync::Arc;
//! use service_framework::mock::MockContainer;
//! use service_framework::ContainerError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut mock = MockContainer::new();
//! mock.expect_has("clock").return_ok(true);
//! mock.expect_resolve("clock").return_ok(Arc::new(42u32));
//! mock.expect_resolve("radio").return_err(ContainerError::NotFound("radio".into()));
//!
//! let client = mock.client();
//! assert!(client.has("clock").await.unwrap());
//! assert_eq!(*client.resolve_as::<u32>("clock").await.unwrap(), 42);
//! assert!(client.resolve("radio").await.is_err());
//!
//! mock.verify();
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::client::ContainerClient;
use crate::error::ContainerError;
use crate::instance::{Instance, ServiceHandle};
use crate::message::ContainerRequest;

enum Expectation {
    Has {
        id: String,
        response: Result<bool, ContainerError>,
    },
    Resolve {
        id: String,
        response: Result<Instance, ContainerError>,
    },
    Query {
        interface: String,
        response: Result<Vec<ServiceHandle>, ContainerError>,
    },
    Startup {
        response: Result<(), ContainerError>,
    },
    Shutdown {
        response: Result<(), ContainerError>,
    },
}

type Expectations = Arc<Mutex<VecDeque<Expectation>>>;

fn push(expectations: &Expectations, expectation: Expectation) {
    expectations
        .lock()
        .expect("expectation queue poisoned")
        .push_back(expectation);
}

pub struct MockContainer {
    client: ContainerClient,
    expectations: Expectations,
    _handle: tokio::task::JoinHandle<()>,
}

impl Default for MockContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockContainer {
    /// Creates a mock with no expectations. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<ContainerRequest>(100);
        let expectations: Expectations = Arc::new(Mutex::new(VecDeque::new()));
        let queue = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = queue.lock().expect("expectation queue poisoned").pop_front();

                match (request, expectation) {
                    (ContainerRequest::Has { id, respond_to }, Some(Expectation::Has { id: expected, response })) => {
                        assert_eq!(id, expected, "has() called for an unexpected service");
                        let _ = respond_to.send(response);
                    }
                    (
                        ContainerRequest::Resolve { id, respond_to },
                        Some(Expectation::Resolve { id: expected, response }),
                    ) => {
                        assert_eq!(id, expected, "resolve() called for an unexpected service");
                        let _ = respond_to.send(response);
                    }
                    (
                        ContainerRequest::Query { interface, respond_to },
                        Some(Expectation::Query { interface: expected, response }),
                    ) => {
                        assert_eq!(interface, expected, "query() called for an unexpected interface");
                        let _ = respond_to.send(response);
                    }
                    (ContainerRequest::BeginStartup { respond_to }, Some(Expectation::Startup { response })) => {
                        let _ = respond_to.send(response.map(|()| Some(Vec::new())));
                    }
                    (ContainerRequest::BeginShutdown { respond_to }, Some(Expectation::Shutdown { response })) => {
                        let _ = respond_to.send(response.map(|()| Vec::new()));
                    }
                    (request, _) => {
                        panic!("Unexpected request or expectation mismatch: {request:?}");
                    }
                }
            }
        });

        Self {
            client: ContainerClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    pub fn client(&self) -> ContainerClient {
        self.client.clone()
    }

    pub fn expect_has(&mut self, id: &str) -> HasExpectation {
        HasExpectation {
            id: id.to_string(),
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_resolve(&mut self, id: &str) -> ResolveExpectation {
        ResolveExpectation {
            id: id.to_string(),
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_query(&mut self, interface: &str) -> QueryExpectation {
        QueryExpectation {
            interface: interface.to_string(),
            expectations: self.expectations.clone(),
        }
    }

    /// Expects a `startup()`; a successful startup activates nothing.
    pub fn expect_startup(&mut self) -> LifecycleExpectation {
        LifecycleExpectation {
            shutdown: false,
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_shutdown(&mut self) -> LifecycleExpectation {
        LifecycleExpectation {
            shutdown: true,
            expectations: self.expectations.clone(),
        }
    }

    /// Panics if any expectation was not consumed.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().expect("expectation queue poisoned").len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

pub struct HasExpectation {
    id: String,
    expectations: Expectations,
}

impl HasExpectation {
    pub fn return_ok(self, present: bool) {
        push(
            &self.expectations,
            Expectation::Has {
                id: self.id,
                response: Ok(present),
            },
        );
    }

    pub fn return_err(self, error: ContainerError) {
        push(
            &self.expectations,
            Expectation::Has {
                id: self.id,
                response: Err(error),
            },
        );
    }
}

pub struct ResolveExpectation {
    id: String,
    expectations: Expectations,
}

impl ResolveExpectation {
    pub fn return_ok(self, instance: Instance) {
        push(
            &self.expectations,
            Expectation::Resolve {
                id: self.id,
                response: Ok(instance),
            },
        );
    }

    pub fn return_err(self, error: ContainerError) {
        push(
            &self.expectations,
            Expectation::Resolve {
                id: self.id,
                response: Err(error),
            },
        );
    }
}

pub struct QueryExpectation {
    interface: String,
    expectations: Expectations,
}

impl QueryExpectation {
    pub fn return_ok(self, handles: Vec<ServiceHandle>) {
        push(
            &self.expectations,
            Expectation::Query {
                interface: self.interface,
                response: Ok(handles),
            },
        );
    }

    pub fn return_err(self, error: ContainerError) {
        push(
            &self.expectations,
            Expectation::Query {
                interface: self.interface,
                response: Err(error),
            },
        );
    }
}

pub struct LifecycleExpectation {
    shutdown: bool,
    expectations: Expectations,
}

impl LifecycleExpectation {
    pub fn return_ok(self) {
        self.respond(Ok(()));
    }

    pub fn return_err(self, error: ContainerError) {
        self.respond(Err(error));
    }

    fn respond(self, response: Result<(), ContainerError>) {
        let expectation = if self.shutdown {
            Expectation::Shutdown { response }
        } else {
            Expectation::Startup { response }
        };
        push(&self.expectations, expectation);
    }
}
