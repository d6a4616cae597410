//! Command-line interface for rust_limma

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rust_limma")]
#[command(author = "SunJu Kim")]
#[command(version)]
#[command(about = "limma-voom differential expression analysis in Rust")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full limma-voom analysis
    #[command(
        about = "Run the full limma-voom analysis",
        long_about = "Run the full limma-voom analysis\n\n\
            Performs the complete pipeline: TMM normalization, expression\n\
            filtering, the voom precision-weighting transform, per-gene\n\
            weighted least squares, contrast testing with empirical Bayes\n\
            moderation, and multiple-testing correction.",
        after_long_help = "\
Examples:
  # Basic two-condition comparison
  rust_limma run -c counts.tsv -m metadata.csv -d treatment \\
    --contrast \"treated - control\" -o top_table.tsv

  # With gene annotation columns in the output
  rust_limma run -c counts.tsv -m metadata.csv -a annotation.tsv \\
    -d treatment --contrast \"treated - control\" -o top_table.tsv

  # With batch correction and the normalized expression matrix saved
  rust_limma run -c counts.tsv -m metadata.csv -d treatment \\
    --covariate batch --contrast \"treated - control\" \\
    --expression-out log2cpm.tsv -o top_table.tsv

  # Without the expression filter, BY correction, logFC ordering
  rust_limma run -c counts.tsv -m metadata.csv -d treatment \\
    --contrast \"treated - control\" --no-filter --adjust BY --sort logfc"
    )]
    Run {
        /// Path to the count matrix file (TSV)
        #[arg(short, long,
            long_help = "Path to the count matrix file.\n\
                Format: first column = gene ids, remaining columns = raw counts per sample.\n\
                Tab- and comma-delimited files are both accepted (auto-detected).")]
        counts: String,

        /// Path to the sample metadata file (CSV)
        #[arg(short, long,
            long_help = "Path to the sample metadata file.\n\
                Format: first column = sample ids, in the same order as the count\n\
                matrix columns; remaining columns = experimental variables.")]
        metadata: String,

        /// Path to a gene annotation file (TSV)
        #[arg(short, long,
            long_help = "Optional gene annotation table.\n\
                Format: first column = gene ids, remaining columns are carried\n\
                into the results table unchanged.")]
        annotation: Option<String>,

        /// Design variable (variable of interest)
        #[arg(short, long,
            long_help = "Main design variable for differential expression.\n\
                Must match a column name in the metadata file. The design uses\n\
                group-means coding (~0 + group), so contrasts name its levels directly.")]
        design: String,

        /// Contrast to test, e.g. "treated - control"
        #[arg(long,
            long_help = "Contrast over design coefficients.\n\
                Either \"levelA - levelB\" naming two levels of the design variable,\n\
                or a single coefficient name (covariate coefficients included).")]
        contrast: String,

        /// Additional categorical covariate
        #[arg(long, value_name = "VAR",
            long_help = "Additional categorical covariates for batch effect correction.\n\
                Can be specified multiple times: --covariate batch --covariate lane")]
        covariate: Vec<String>,

        /// Continuous covariate
        #[arg(long, value_name = "VAR",
            long_help = "Continuous covariates. The metadata column must be numeric.\n\
                Can be specified multiple times: --continuous age --continuous rin")]
        continuous: Vec<String>,

        /// Reference level (format: factor=level)
        #[arg(long, value_name = "FACTOR=LEVEL",
            long_help = "Reference level for a covariate factor.\n\
                Format: factor=level (e.g., --reference batch=b1).\n\
                Without this, the alphabetically first level is the reference.")]
        reference: Vec<String>,

        /// Output file path for the top table [default: top_table.tsv]
        #[arg(short, long, default_value = "top_table.tsv")]
        output: String,

        /// Optional output path for the normalized log2-CPM matrix
        #[arg(long, value_name = "FILE")]
        expression_out: Option<String>,

        /// Normalization method [default: tmm]
        #[arg(long, default_value = "tmm",
            long_help = "Normalization factor method.\n\
                tmm:           Trimmed mean of M-values (default)\n\
                upperquartile: 75th-percentile scaling\n\
                none:          Library size only")]
        norm: String,

        /// Disable the expression filter
        #[arg(long,
            long_help = "Skip expression filtering and model every gene.\n\
                By default genes too weakly expressed to support inference are\n\
                removed before fitting, using the smallest design group size.")]
        no_filter: bool,

        /// Minimum per-sample count for the expression filter [default: 10]
        #[arg(long, default_value = "10")]
        min_count: f64,

        /// Minimum total count for the expression filter [default: 15]
        #[arg(long, default_value = "15")]
        min_total_count: f64,

        /// LOWESS span for the voom mean-variance trend [default: 0.5]
        #[arg(long, default_value = "0.5")]
        span: f64,

        /// Significance threshold for the printed summary [default: 0.05]
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Multiple-testing adjustment [default: BH]
        #[arg(long, default_value = "BH",
            long_help = "P-value adjustment method.\n\
                BH:         Benjamini-Hochberg FDR (default)\n\
                BY:         Benjamini-Yekutieli FDR\n\
                holm:       Holm step-down FWER\n\
                bonferroni: Bonferroni FWER\n\
                none:       No adjustment")]
        adjust: String,

        /// Sort order for the top table [default: pvalue]
        #[arg(long, default_value = "pvalue",
            long_help = "Row order of the results table.\n\
                pvalue: ascending raw p-value (default)\n\
                logfc:  descending absolute log fold change\n\
                none:   input order")]
        sort: String,

        /// Keep only the top N genes in the output table
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Compute normalization factors and the log2-CPM matrix only
    #[command(
        long_about = "Estimate normalization factors and write the normalized\n\
            log2-CPM expression matrix.",
        after_long_help = "\
Examples:
  rust_limma normalize -c counts.tsv -o log2cpm.tsv
  rust_limma normalize -c counts.tsv -o log2cpm.tsv --norm upperquartile"
    )]
    Normalize {
        /// Path to the count matrix file (TSV)
        #[arg(short, long)]
        counts: String,

        /// Output file path
        #[arg(short, long)]
        output: String,

        /// Normalization method [default: tmm]
        #[arg(long, default_value = "tmm",
            long_help = "Normalization factor method.\n\
                tmm:           Trimmed mean of M-values (default)\n\
                upperquartile: 75th-percentile scaling\n\
                none:          Library size only")]
        norm: String,
    },

    /// Apply the voom transform and write expression values and weights
    #[command(
        long_about = "Apply the voom transform against a design matrix.\n\n\
            Writes the log2-CPM expression matrix and, optionally, the matrix\n\
            of per-observation precision weights.",
        after_long_help = "\
Examples:
  rust_limma voom -c counts.tsv -m metadata.csv -d treatment -o log2cpm.tsv
  rust_limma voom -c counts.tsv -m metadata.csv -d treatment \\
    -o log2cpm.tsv --weights-out weights.tsv --span 0.4"
    )]
    Voom {
        /// Path to the count matrix file (TSV)
        #[arg(short, long)]
        counts: String,

        /// Path to the sample metadata file (CSV)
        #[arg(short, long)]
        metadata: String,

        /// Design variable
        #[arg(short, long)]
        design: String,

        /// Output file path for the log2-CPM matrix [default: voom_log2cpm.tsv]
        #[arg(short, long, default_value = "voom_log2cpm.tsv")]
        output: String,

        /// Optional output path for the precision weight matrix
        #[arg(long, value_name = "FILE")]
        weights_out: Option<String>,

        /// LOWESS span for the mean-variance trend [default: 0.5]
        #[arg(long, default_value = "0.5")]
        span: f64,
    },
}
