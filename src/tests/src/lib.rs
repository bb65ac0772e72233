// Cross-crate scenarios: real runners, caches and HTTP providers wired the
// way the binary wires them, with the model served by a mock server.

#[cfg(test)]
mod support;

#[cfg(test)]
mod context_flow;
#[cfg(test)]
mod diagnostic_flow;
#[cfg(test)]
mod recovery_flow;
#[cfg(test)]
mod runner_properties;
