// crates/engine-core/tests/regression_scenarios.rs
use std::collections::HashMap;
use std::sync::Arc;

use engine_core::{validate_symbol, EngineError, IdGenerator, Order, OrderId, SymbolEngine, Trade};
use engine_protocol::csv_codec::{format_response, parse_input_line};
use engine_protocol::{ErrorKind, Request, Response};

const INPUT: &str = include_str!("data/scenarios.csv");

/// Drives `SymbolEngine`s the way the server does, committing every
/// proposal immediately and keeping the order/trade history in memory.
struct Harness {
    ids: Arc<IdGenerator>,
    engines: HashMap<String, SymbolEngine>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

impl Harness {
    fn new() -> Self {
        Harness {
            ids: Arc::new(IdGenerator::new()),
            engines: HashMap::new(),
            orders: HashMap::new(),
            trades: Vec::new(),
        }
    }

    fn engine(&mut self, symbol: &str) -> &mut SymbolEngine {
        let ids = self.ids.clone();
        self.engines
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolEngine::new(symbol, ids))
    }

    fn handle(&mut self, req: Request) -> Response {
        match req {
            Request::Submit(new) => {
                if let Err(e) = validate_symbol(&new.symbol) {
                    return Response::error(ErrorKind::Validation, e.to_string());
                }
                let engine = self.engine(&new.symbol);
                match engine.propose_submit(&new) {
                    Ok(proposal) => {
                        let delta = proposal.delta.clone();
                        let submission = engine.commit(proposal);
                        self.record(delta.new_orders, delta.updated_orders, delta.new_trades);
                        Response::Order {
                            order: submission.order,
                            trades: submission.trades,
                        }
                    }
                    Err(e @ EngineError::Validation(_)) => {
                        Response::error(ErrorKind::Validation, e.to_string())
                    }
                    Err(e) => Response::error(ErrorKind::Internal, e.to_string()),
                }
            }
            Request::Cancel { id } => {
                let Some(known) = self.orders.get(&id).cloned() else {
                    return Response::error(ErrorKind::NotFound, format!("order {} not found", id));
                };
                let engine = self.engine(&known.symbol);
                match engine.propose_cancel(id) {
                    Ok(proposal) => {
                        let delta = proposal.delta.clone();
                        let order = engine.commit(proposal);
                        self.record(vec![], delta.updated_orders, vec![]);
                        Response::Canceled { order }
                    }
                    Err(EngineError::NotResting(_)) => Response::error(
                        ErrorKind::NotCancelable,
                        format!("order {} is {}", id, known.status.as_str()),
                    ),
                    Err(e) => Response::error(ErrorKind::Internal, e.to_string()),
                }
            }
            Request::OrderBook { symbol } => Response::order_book(&self.engine(&symbol).snapshot()),
            Request::Trades { symbol } => Response::Trades {
                trades: self
                    .trades
                    .iter()
                    .filter(|t| t.symbol == symbol)
                    .cloned()
                    .collect(),
                symbol,
            },
            Request::OrderStatus { id } => match self.orders.get(&id) {
                Some(order) => Response::OrderStatus {
                    order: order.clone(),
                },
                None => Response::error(ErrorKind::NotFound, format!("order {} not found", id)),
            },
        }
    }

    fn record(&mut self, new: Vec<Order>, updated: Vec<Order>, trades: Vec<Trade>) {
        for order in new.into_iter().chain(updated) {
            self.orders.insert(order.id, order);
        }
        self.trades.extend(trades);
    }
}

struct Scenario {
    name: String,
    steps: Vec<(String, Vec<String>)>,
}

fn load_scenarios() -> Vec<Scenario> {
    let mut scenarios: Vec<Scenario> = Vec::new();
    for raw in INPUT.lines() {
        let line = raw.trim();
        if let Some(name) = line.strip_prefix("#name:") {
            scenarios.push(Scenario {
                name: name.trim().to_string(),
                steps: Vec::new(),
            });
        } else if let Some(expected) = line.strip_prefix('>') {
            let scenario = scenarios.last_mut().expect("expectation outside a scenario");
            let step = scenario.steps.last_mut().expect("expectation before a request");
            step.1.push(expected.trim().to_string());
        } else if !line.is_empty() && !line.starts_with('#') {
            let scenario = scenarios.last_mut().expect("request outside a scenario");
            scenario.steps.push((line.to_string(), Vec::new()));
        }
    }
    scenarios
}

#[test]
fn scripted_scenarios_match_expected_output() {
    let scenarios = load_scenarios();
    assert!(scenarios.len() >= 6, "scenario file should load");

    for scenario in scenarios {
        let mut harness = Harness::new();
        for (input, expected) in &scenario.steps {
            let req = parse_input_line(input)
                .unwrap_or_else(|e| panic!("[{}] bad input {:?}: {}", scenario.name, input, e))
                .expect("scenario steps are never blank");
            let actual = format_response(&harness.handle(req));
            assert_eq!(
                &actual, expected,
                "scenario {:?}, request {:?}",
                scenario.name, input
            );
        }
        for engine in harness.engines.values() {
            engine.check_invariants().unwrap();
        }
    }
}

#[test]
fn every_request_in_the_script_parses() {
    let requests = INPUT
        .lines()
        .filter(|l| !l.trim_start().starts_with('>'))
        .filter_map(|l| parse_input_line(l).expect("script line should parse"))
        .count();
    assert!(requests > 20);
}
