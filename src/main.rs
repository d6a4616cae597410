//! rust_limma command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use rust_limma::cli::{Cli, Commands};
use rust_limma::prelude::*;
use rust_limma::normalization;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run {
            counts,
            metadata,
            annotation,
            design,
            contrast,
            covariate,
            continuous,
            reference,
            output,
            expression_out,
            norm,
            no_filter,
            min_count,
            min_total_count,
            span,
            alpha,
            adjust,
            sort,
            top,
            threads,
        } => run_analysis(RunArgs {
            counts_path: counts,
            metadata_path: metadata,
            annotation_path: annotation,
            design,
            contrast,
            covariates: covariate,
            continuous,
            reference_levels: reference,
            output_path: output,
            expression_out,
            norm,
            no_filter,
            min_count,
            min_total_count,
            span,
            alpha,
            adjust,
            sort,
            top,
            threads,
        }),
        Commands::Normalize {
            counts,
            output,
            norm,
        } => run_normalize(&counts, &output, &norm),
        Commands::Voom {
            counts,
            metadata,
            design,
            output,
            weights_out,
            span,
        } => run_voom_command(&counts, &metadata, &design, &output, weights_out.as_deref(), span),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct RunArgs {
    counts_path: String,
    metadata_path: String,
    annotation_path: Option<String>,
    design: String,
    contrast: String,
    covariates: Vec<String>,
    continuous: Vec<String>,
    reference_levels: Vec<String>,
    output_path: String,
    expression_out: Option<String>,
    norm: String,
    no_filter: bool,
    min_count: f64,
    min_total_count: f64,
    span: f64,
    alpha: f64,
    adjust: String,
    sort: String,
    top: Option<usize>,
    threads: usize,
}

fn parse_norm_method(name: &str) -> Result<NormMethod> {
    match name.to_ascii_lowercase().as_str() {
        "tmm" => Ok(NormMethod::Tmm),
        "upperquartile" | "uq" => Ok(NormMethod::UpperQuartile),
        "none" => Ok(NormMethod::None),
        other => Err(LimmaError::InvalidInput {
            reason: format!(
                "Unknown normalization method '{}'. Use: tmm, upperquartile, none",
                other
            ),
        }),
    }
}

fn run_analysis(args: RunArgs) -> Result<()> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .ok();
    }

    let norm_method = parse_norm_method(&args.norm)?;
    let adjust: AdjustMethod = args
        .adjust
        .parse()
        .map_err(|reason| LimmaError::InvalidInput { reason })?;
    let sort: SortBy = args
        .sort
        .parse()
        .map_err(|reason| LimmaError::InvalidInput { reason })?;

    info!("Loading count matrix from: {}", args.counts_path);
    let counts = read_count_matrix(&args.counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());

    info!("Loading metadata from: {}", args.metadata_path);
    let mut metadata = read_sample_metadata(&args.metadata_path)?;

    // Continuous covariates arrive as text columns; promote them
    for cov in &args.continuous {
        metadata.factor_to_continuous(cov)?;
    }

    let annotation = match &args.annotation_path {
        Some(path) => {
            info!("Loading gene annotation from: {}", path);
            Some(read_gene_annotation(path)?)
        }
        None => None,
    };

    let mut dge = DgeList::new(counts, metadata)?;
    if let Some(ann) = annotation {
        dge = dge.with_annotation(ann);
    }

    info!("Estimating normalization factors (method: {})...", args.norm);
    calc_norm_factors(&mut dge, norm_method)?;

    if !args.no_filter {
        let params = FilterParams {
            min_count: args.min_count,
            min_total_count: args.min_total_count,
            ..FilterParams::default()
        };
        let keep = filter_by_expr(&dge, &args.design, &params)?;
        dge = dge.subset_genes(&keep)?;
        // Factors were estimated on the unfiltered matrix; re-estimate on
        // the genes that remain
        calc_norm_factors(&mut dge, norm_method)?;
    }

    // Design: group-means coding for the main factor, treatment coding for
    // covariates, so the contrast can name the main factor's levels
    let mut builder = DesignBuilder::new(dge.sample_metadata())
        .no_intercept()
        .factor(&args.design);
    for cov in &args.covariates {
        builder = builder.factor(cov);
    }
    for cov in &args.continuous {
        builder = builder.continuous(cov);
    }
    for ref_spec in &args.reference_levels {
        match ref_spec.split_once('=') {
            Some((factor, level)) => {
                builder = builder.reference_level(factor, level);
            }
            None => {
                return Err(LimmaError::InvalidInput {
                    reason: format!("Invalid reference format '{}'. Use: factor=level", ref_spec),
                });
            }
        }
    }

    let formula: Vec<&str> = std::iter::once(args.design.as_str())
        .chain(args.covariates.iter().map(|s| s.as_str()))
        .chain(args.continuous.iter().map(|s| s.as_str()))
        .collect();
    info!("Design: ~ 0 + {}", formula.join(" + "));
    let (design, info_) = builder.build()?;

    let contrast = ContrastMatrix::parse(&args.contrast, &info_.coef_names)?;
    info!("Testing contrast: {}", args.contrast);

    let results = run_voom_limma(&mut dge, &design, &info_, &contrast, args.span, adjust)?;

    if let Some(expr_path) = &args.expression_out {
        info!("Writing normalized log2-CPM matrix to: {}", expr_path);
        let lcpm = dge.log2_cpm();
        write_expression_matrix(
            expr_path,
            dge.counts().gene_ids(),
            dge.counts().sample_ids(),
            lcpm.view(),
        )?;
    }

    info!("Writing top table to: {}", args.output_path);
    let table = top_table(&results, dge.annotation(), sort, args.top);
    write_top_table(&args.output_path, &table)?;

    println!("\n{}", results.summary(args.alpha));

    Ok(())
}

fn run_normalize(counts_path: &str, output_path: &str, norm: &str) -> Result<()> {
    let norm_method = parse_norm_method(norm)?;

    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());

    let metadata = SampleMetadata::new(counts.sample_ids().to_vec());
    let mut dge = DgeList::new(counts, metadata)?;

    info!("Estimating normalization factors (method: {})...", norm);
    calc_norm_factors(&mut dge, norm_method)?;

    let factors = dge.norm_factors().unwrap_or(&[]);
    for (id, f) in dge.counts().sample_ids().iter().zip(factors.iter()) {
        info!("  {}: factor {:.4}", id, f);
    }

    info!("Writing normalized log2-CPM matrix to: {}", output_path);
    let lcpm = dge.log2_cpm();
    write_expression_matrix(
        output_path,
        dge.counts().gene_ids(),
        dge.counts().sample_ids(),
        lcpm.view(),
    )?;

    info!("Done!");
    Ok(())
}

fn run_voom_command(
    counts_path: &str,
    metadata_path: &str,
    design: &str,
    output_path: &str,
    weights_path: Option<&str>,
    span: f64,
) -> Result<()> {
    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());

    info!("Loading metadata from: {}", metadata_path);
    let metadata = read_sample_metadata(metadata_path)?;

    let mut dge = DgeList::new(counts, metadata)?;

    info!("Estimating normalization factors (method: tmm)...");
    calc_norm_factors(&mut dge, normalization::NormMethod::Tmm)?;

    let (design_matrix, info_) = DesignBuilder::new(dge.sample_metadata())
        .no_intercept()
        .factor(design)
        .build()?;

    info!("Applying voom transform (span: {})...", span);
    let v = voom(&dge, &design_matrix, &info_, span)?;

    info!("Writing log2-CPM matrix to: {}", output_path);
    write_expression_matrix(
        output_path,
        dge.counts().gene_ids(),
        dge.counts().sample_ids(),
        v.log2_cpm.view(),
    )?;

    if let Some(path) = weights_path {
        info!("Writing precision weights to: {}", path);
        write_expression_matrix(
            path,
            dge.counts().gene_ids(),
            dge.counts().sample_ids(),
            v.weights.view(),
        )?;
    }

    info!("Done! voom transform complete.");
    Ok(())
}
