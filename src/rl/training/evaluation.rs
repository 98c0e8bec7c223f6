//! Evaluation
//!
//! Runs a trained agent greedily over one episode and compares the result
//! with buying at the first close and holding to the last.

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::rl::algorithms::dqn::DqnAgent;
use crate::rl::core::action::DiscreteAction;
use crate::rl::environment::TradingEnvironment;

/// Outcome of a greedy evaluation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub starting_balance: f64,
    pub final_portfolio_value: f64,
    pub agent_return_pct: f64,
    pub buy_and_hold_value: f64,
    pub buy_and_hold_return_pct: f64,
    pub buy_count: usize,
    pub sell_count: usize,
    pub hold_count: usize,
    pub beat_buy_and_hold: bool,
    /// Actions in step order, starting at the environment's first step
    #[serde(skip)]
    pub actions: Vec<DiscreteAction>,
}

/// Value of `starting_balance` invested at the first close and held to the last
pub fn buy_and_hold_value(starting_balance: f64, first_close: f64, last_close: f64) -> f64 {
    starting_balance / first_close * last_close
}

fn return_pct(value: f64, starting_balance: f64) -> f64 {
    (value / starting_balance - 1.0) * 100.0
}

/// Run one greedy episode with exploration disabled.
///
/// The agent's epsilon is restored afterwards.
pub fn evaluate(agent: &mut DqnAgent, env: &mut TradingEnvironment) -> Result<EvaluationReport> {
    let saved_epsilon = agent.epsilon();
    agent.set_epsilon(0.0);
    let outcome = run_greedy(agent, env);
    agent.set_epsilon(saved_epsilon);
    let (final_value, actions) = outcome?;

    let starting_balance = env.config().starting_balance;
    let rows = &env.series().rows()[env.start_step()..];
    let baseline = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => {
            buy_and_hold_value(starting_balance, first.close_price, last.close_price)
        }
        _ => starting_balance,
    };

    let count = |a: DiscreteAction| actions.iter().filter(|&&x| x == a).count();
    let agent_return_pct = return_pct(final_value, starting_balance);
    let buy_and_hold_return_pct = return_pct(baseline, starting_balance);

    let report = EvaluationReport {
        starting_balance,
        final_portfolio_value: final_value,
        agent_return_pct,
        buy_and_hold_value: baseline,
        buy_and_hold_return_pct,
        buy_count: count(DiscreteAction::Buy),
        sell_count: count(DiscreteAction::Sell),
        hold_count: count(DiscreteAction::Hold),
        beat_buy_and_hold: agent_return_pct > buy_and_hold_return_pct,
        actions,
    };

    info!(
        "Evaluation: agent={:.2} ({:+.2}%), buy_and_hold={:.2} ({:+.2}%)",
        report.final_portfolio_value,
        report.agent_return_pct,
        report.buy_and_hold_value,
        report.buy_and_hold_return_pct
    );
    Ok(report)
}

fn run_greedy(
    agent: &mut DqnAgent,
    env: &mut TradingEnvironment,
) -> Result<(f64, Vec<DiscreteAction>)> {
    let (mut state, mut info) = env.reset()?;
    let mut actions = Vec::new();

    // A single-row series is terminal immediately; no action is taken
    if env.current_step() + 1 >= env.series().len() {
        return Ok((info.portfolio_value, actions));
    }

    loop {
        let action = agent.act(&state)?;
        actions.push(action);
        let result = env.step(action)?;
        info = result.info;
        if result.done() {
            break;
        }
        state = result.observation;
    }

    Ok((info.portfolio_value, actions))
}
