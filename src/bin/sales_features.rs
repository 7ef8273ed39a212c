use clap::Parser;
use sales_features::cli::Cli;
use sales_features::{
    init_logging, log_app_failure, log_app_start, log_run_config, logging_config_from_env,
    run_pipeline,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let config = Cli::parse().into_config();
    log_run_config(&config);

    let report = match run_pipeline(&config) {
        Ok(report) => report,
        Err(err) => {
            log_app_failure(&err);
            return Err(err.into());
        }
    };

    println!(
        "wrote {} rows to {} (sha256 {})",
        report.export.rows_written,
        report.export.path.display(),
        report.export.sha256
    );
    for (rank, entry) in report.wmape.entries.iter().enumerate() {
        println!(
            "{:>2}. product={} store={} wmape={:.4} days={}",
            rank + 1,
            entry.product_id,
            entry.store_id,
            entry.wmape,
            entry.scored_days
        );
    }
    println!(
        "unscored pairs: {} without MA7_P, {} with zero sales",
        report.wmape.pairs_without_forecast, report.wmape.pairs_with_zero_actual
    );

    Ok(())
}
