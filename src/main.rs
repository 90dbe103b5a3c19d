use anyhow::Context;
use clap::Parser;
use ensemble_tabpfn::adapters::csv_io;
use ensemble_tabpfn::config::cli::{Command, EvaluateArgs, FitArgs, PredictArgs};
use ensemble_tabpfn::utils::error::ErrorSeverity;
use ensemble_tabpfn::utils::monitor::{Phase, SystemMonitor};
use ensemble_tabpfn::utils::{logger, validation::Validate};
use ensemble_tabpfn::{CliConfig, EnsembleConfig, EnsembleError, EnsembleTabPfn};

fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose, config.log_format);

    tracing::info!("Starting ensemble-tabpfn CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let result = match &config.command {
        Command::Fit(args) => run_fit(args, config.monitor),
        Command::Predict(args) => run_predict(args, config.monitor),
        Command::Evaluate(args) => run_evaluate(args, config.monitor),
    };

    if let Err(e) = result {
        match e.downcast_ref::<EnsembleError>() {
            Some(err) => {
                tracing::error!(
                    "❌ {:#} (Category: {:?}, Severity: {:?})",
                    e,
                    err.category(),
                    err.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", err.recovery_suggestion());

                eprintln!("❌ {}", err.user_friendly_message());
                eprintln!("💡 Suggestion: {}", err.recovery_suggestion());

                // 根據錯誤嚴重程度決定退出碼
                let exit_code = match err.severity() {
                    ErrorSeverity::Low => 0,
                    ErrorSeverity::Medium => 2,
                    ErrorSeverity::High => 1,
                    ErrorSeverity::Critical => 3,
                };
                if exit_code > 0 {
                    std::process::exit(exit_code);
                }
            }
            None => {
                tracing::error!("❌ {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_fit(args: &FitArgs, monitor_flag: bool) -> anyhow::Result<()> {
    let file_config = match &args.config {
        Some(path) => EnsembleConfig::from_file(path)
            .with_context(|| format!("failed to load config file '{}'", path))?,
        None => EnsembleConfig::default(),
    };
    let monitor = SystemMonitor::new(monitor_flag || file_config.monitoring_enabled());
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut params = file_config.ensemble;
    args.overrides.apply(&mut params);

    let dataset = csv_io::read_dataset(&args.input, args.target.as_deref())?;
    tracing::info!(
        "📁 Loaded {} rows, {} features from {} (target: {})",
        dataset.features.nrows(),
        dataset.features.ncols(),
        args.input,
        dataset.target_name
    );
    let n_rows = dataset.labels.len();
    monitor.finish_phase(Phase::Load, n_rows);

    let mut estimator = EnsembleTabPfn::new(params)?;
    estimator.fit(dataset.features.view(), &dataset.labels)?;
    let fit_time = monitor.finish_phase(Phase::Fit, n_rows);

    estimator.save_model(&args.model)?;

    if let Some(fitted) = estimator.fitted() {
        println!("✅ Model saved to: {}", args.model);
        println!(
            "   members: {}, iterations: {}, early stop: {}",
            fitted.members.len(),
            fitted.iterations_run,
            fitted.stopped_early
        );
        println!("   fit time: {:.2?}", fit_time);
        if let Some(loss) = fitted.best_validation_loss {
            println!("   best validation log loss: {:.5}", loss);
        }
    }
    monitor.log_final_stats();
    Ok(())
}

fn run_predict(args: &PredictArgs, monitor_flag: bool) -> anyhow::Result<()> {
    let monitor = SystemMonitor::new(monitor_flag);
    let estimator = EnsembleTabPfn::load_model(&args.model)
        .with_context(|| format!("failed to load model '{}'", args.model))?;
    let (_, features) = csv_io::read_features(&args.input, args.drop_column.as_deref())?;
    monitor.finish_phase(Phase::Load, features.nrows());

    let result = estimator.predict_result(features.view())?;
    monitor.finish_phase(Phase::Predict, features.nrows());

    let (preds, probs) = match (result.preds, result.probs) {
        (Some(preds), Some(probs)) => (preds, probs),
        _ => anyhow::bail!("aggregation produced no predictions"),
    };
    let fitted = estimator.fitted().ok_or(EnsembleError::NotFittedError)?;
    let labels = fitted.decode(&preds.to_vec())?;
    let proba = args
        .proba
        .then(|| (fitted.encoder.classes(), probs.view()));

    match &args.output {
        Some(path) => {
            csv_io::write_predictions(path, &labels, proba)?;
            tracing::info!("📁 {} predictions written to {}", labels.len(), path);
        }
        None => csv_io::write_predictions_to(std::io::stdout().lock(), &labels, proba)?,
    }
    monitor.log_final_stats();
    Ok(())
}

fn run_evaluate(args: &EvaluateArgs, monitor_flag: bool) -> anyhow::Result<()> {
    let monitor = SystemMonitor::new(monitor_flag);
    let estimator = EnsembleTabPfn::load_model(&args.model)
        .with_context(|| format!("failed to load model '{}'", args.model))?;
    let dataset = csv_io::read_dataset(&args.input, args.target.as_deref())?;
    monitor.finish_phase(Phase::Load, dataset.labels.len());

    let accuracy = estimator.score(dataset.features.view(), &dataset.labels)?;
    monitor.finish_phase(Phase::Predict, dataset.labels.len());

    println!("rows: {}", dataset.labels.len());
    println!("accuracy: {:.4}", accuracy);
    monitor.log_final_stats();
    Ok(())
}
