//! Topic consumer integration tests on the in-memory broker.


mod health;
mod listen;
