//! Simulated Portfolio Engine Walkthrough.
//!
//! Demonstrates the full session lifecycle against scripted collaborators:
//! oracle-driven allocation, transactional rebalancing with rollback,
//! liquidation, conditional triggers, and settlement.

use folio_core::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn sim_engine(oracle_responses: Vec<String>) -> (Arc<Engine>, Arc<StaticPriceSource>) {
    let prices = Arc::new(StaticPriceSource::with_prices(&[
        ("bitcoin", dec!(50000)),
        ("ethereum", dec!(2000)),
        ("solana", dec!(150)),
    ]));

    let mut snapshot_path = std::env::temp_dir();
    snapshot_path.push(format!("folio-sim-{}.json", std::process::id()));
    let config = EngineConfig {
        snapshot_path,
        ..EngineConfig::default()
    };

    let oracle = Arc::new(OracleRouter::single(Arc::new(ScriptedOracle::new(
        "sim-oracle",
        oracle_responses,
    ))));

    let engine = Arc::new(Engine::new(
        config,
        Arc::clone(&prices) as Arc<dyn MarketDataSource>,
        oracle,
        Arc::new(LogSink),
    ));
    (engine, prices)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Simulated Portfolio Engine");
    println!("Session Lifecycle, Risk Limits, Rollback, Liquidation\n");

    scenario_1_open_and_allocate().await?;
    scenario_2_rebalance_and_rollback().await?;
    scenario_3_liquidation().await?;
    scenario_4_stop_loss().await?;
    scenario_5_settlement().await?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Session open with an oracle-proposed initial allocation.
async fn scenario_1_open_and_allocate() -> anyhow::Result<()> {
    println!("Scenario 1: Open and Allocate\n");

    let allocation = r#"```json
{
  "analysis": "balanced start",
  "actions": [
    {"action": "BUY_SPOT", "coin": "ethereum", "percentage_of_cash": 20},
    {"action": "OPEN_LONG", "coin": "bitcoin", "percentage_of_cash": 10, "leverage": 5}
  ]
}
```"#;
    let (engine, _) = sim_engine(vec![allocation.to_string()]);

    engine.open_session("alice", dec!(10000)).await?;
    let status = engine.session_status("alice").await?;

    println!("  Alice opens with $10,000");
    println!("  Cash: ${}", status.cash.round_dp(2));
    println!("  Spot positions: {}", status.spot_positions.len());
    println!("  Futures positions: {}", status.futures_positions.len());
    println!("  Account value: ${}\n", status.current_funds.round_dp(2));
    Ok(())
}

/// A rebalance plan applies atomically; a bad step rolls everything back.
async fn scenario_2_rebalance_and_rollback() -> anyhow::Result<()> {
    println!("Scenario 2: Transactional Rebalance\n");

    let mut portfolio = Portfolio::new("bob", dec!(10000), Timestamp::now());
    let mut prices = PriceTable::new();
    prices.insert(CoinId::new("bitcoin"), Price::new_unchecked(dec!(50000)));
    prices.insert(CoinId::new("ethereum"), Price::new_unchecked(dec!(2000)));

    let plan = RebalancePlan::from_oracle_text(
        r#"{"actions": [
            {"action": "BUY_SPOT", "coin": "ethereum", "percentage_of_cash": 30},
            {"action": "OPEN_SHORT", "coin": "bitcoin", "percentage_of_cash": 200, "leverage": 3}
        ]}"#,
    );
    println!("  Plan of {} actions, second one out of range", plan.actions.len());

    let outcome = transaction::execute_plan(
        &mut portfolio,
        &plan.actions,
        &prices,
        &RiskLimits::default(),
        &ValuationParams::default(),
        Timestamp::now(),
    );
    match outcome {
        PlanOutcome::RolledBack { completed, failure } => {
            println!("  {} step(s) had applied before the failure", completed.len());
            println!("  Failed at {}: {}", failure.request.action, failure.error);
        }
        PlanOutcome::Applied { .. } => println!("  Unexpected: plan applied"),
    }
    println!(
        "  Cash restored to ${}, positions: {}\n",
        portfolio.cash.round_dp(2),
        portfolio.spot_positions.len()
    );
    Ok(())
}

/// A leveraged long is force-closed when price crosses its liquidation level.
async fn scenario_3_liquidation() -> anyhow::Result<()> {
    println!("Scenario 3: Liquidation\n");

    let (engine, prices) = sim_engine(vec![]);
    engine.open_session("carol", dec!(10000)).await?;
    engine
        .manual_action(
            "carol",
            &ActionRequest::new("OPEN_LONG")
                .coin("bitcoin")
                .percentage_of_cash(dec!(10))
                .leverage(dec!(5)),
        )
        .await?;

    let status = engine.session_status("carol").await?;
    let pos = &status.futures_positions[&CoinId::new("bitcoin")];
    println!("  Long 0.1 BTC at $50,000 with 5x leverage");
    println!("  Liquidation price: ${}", pos.liquidation_price.round_dp(2));

    prices.set_price(CoinId::new("bitcoin"), Price::new_unchecked(dec!(40000)));
    engine.update_all_sessions().await;

    let status = engine.session_status("carol").await?;
    println!("  BTC drops to $40,000");
    println!(
        "  Positions left: {}, account value: ${}\n",
        status.futures_positions.len(),
        status.current_funds.round_dp(2)
    );
    Ok(())
}

/// Stop-loss fires on the monitor tick and realizes the loss.
async fn scenario_4_stop_loss() -> anyhow::Result<()> {
    println!("Scenario 4: Stop Loss\n");

    let (engine, prices) = sim_engine(vec![]);
    engine.open_session("dave", dec!(10000)).await?;
    engine
        .manual_action(
            "dave",
            &ActionRequest::new("OPEN_LONG")
                .coin("bitcoin")
                .percentage_of_cash(dec!(10))
                .leverage(dec!(5)),
        )
        .await?;
    let set = engine
        .manual_action(
            "dave",
            &ActionRequest::new("SET_STOP_LOSS")
                .coin("bitcoin")
                .stop_price(dec!(48000)),
        )
        .await?;
    println!("  {set}");

    prices.set_price(CoinId::new("bitcoin"), Price::new_unchecked(dec!(47500)));
    engine.update_all_sessions().await;

    let status = engine.session_status("dave").await?;
    println!("  BTC drops to $47,500, stop fires");
    println!(
        "  Cash after close: ${}, open positions: {}\n",
        status.cash.round_dp(2),
        status.futures_positions.len()
    );
    Ok(())
}

/// Full settlement with the oracle's performance review.
async fn scenario_5_settlement() -> anyhow::Result<()> {
    println!("Scenario 5: Settlement\n");

    let review = r#"{"analysis": "disciplined run", "rating": 7,
        "strengths": ["kept leverage low"], "weaknesses": ["idle cash"],
        "key_learnings": ["stops saved the account"], "suggestions": ["ladder entries"]}"#;
    let (engine, prices) = sim_engine(vec![review.to_string()]);

    engine.open_session("erin", dec!(10000)).await?;
    engine
        .manual_action(
            "erin",
            &ActionRequest::new("BUY_SPOT")
                .coin("ethereum")
                .percentage_of_cash(dec!(30)),
        )
        .await?;

    prices.set_price(CoinId::new("ethereum"), Price::new_unchecked(dec!(2400)));
    engine.update_all_sessions().await;

    let result = engine.finish_session("erin").await?;
    println!("  Final funds: ${}", result.report.final_funds.round_dp(2));
    println!("  Spot pnl: ${}", result.report.spot_pnl.round_dp(2));
    println!("  Return: {}%", result.report.return_pct.round_dp(2));
    if let Some(review) = result.review {
        println!("  Oracle rating: {}/10", review.rating);
    }
    Ok(())
}
