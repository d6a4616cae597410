//! Delimited-text readers and writers
//!
//! Count matrix and gene annotation tables are tab-delimited, sample
//! metadata is comma-delimited; the delimiter is sniffed from the header
//! line so either layout works everywhere.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::data::{CountMatrix, GeneAnnotation, SampleMetadata};
use crate::error::{LimmaError, Result};
use crate::testing::TopTable;

/// Detect the delimiter from the header line: tab wins when present
fn sniff_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    if header.trim().is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "File is empty".to_string(),
        });
    }
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

fn open_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<File>> {
    let delimiter = sniff_delimiter(&path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?)
}

/// Read a count matrix from a tab-delimited file.
/// Expected format: first column gene ids, header row of sample ids.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let mut reader = open_reader(&path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(LimmaError::InvalidCountMatrix {
            reason: "Count matrix needs a gene id column plus at least one sample".to_string(),
        });
    }
    let sample_ids: Vec<String> = headers.iter().skip(1).map(String::from).collect();
    let n_samples = sample_ids.len();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut values: Vec<f64> = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.len() != n_samples + 1 {
            return Err(LimmaError::InvalidCountMatrix {
                reason: format!(
                    "Row {} has {} columns, expected {}",
                    gene_ids.len() + 2,
                    record.len(),
                    n_samples + 1
                ),
            });
        }
        gene_ids.push(record[0].to_string());
        for field in record.iter().skip(1) {
            let v: f64 = field.parse().map_err(|_| LimmaError::InvalidCountMatrix {
                reason: format!("Invalid count value '{}'", field),
            })?;
            values.push(v);
        }
    }

    if gene_ids.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "No genes found in count matrix".to_string(),
        });
    }

    let n_genes = gene_ids.len();
    let counts = Array2::from_shape_vec((n_genes, n_samples), values).map_err(|e| {
        LimmaError::InvalidCountMatrix {
            reason: format!("Count table is not rectangular: {}", e),
        }
    })?;

    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read sample metadata from a comma-delimited file.
/// Expected format: first column sample ids, remaining columns become
/// categorical factors (promote numeric ones with factor_to_continuous).
pub fn read_sample_metadata<P: AsRef<Path>>(path: P) -> Result<SampleMetadata> {
    let mut reader = open_reader(&path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(LimmaError::InvalidMetadata {
            reason: "Metadata needs a sample id column plus at least one covariate".to_string(),
        });
    }
    let column_names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut sample_ids: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];

    for record in reader.records() {
        let record = record?;
        if record.len() != column_names.len() + 1 {
            return Err(LimmaError::InvalidMetadata {
                reason: format!(
                    "Row {} has {} columns, expected {}",
                    sample_ids.len() + 2,
                    record.len(),
                    column_names.len() + 1
                ),
            });
        }
        sample_ids.push(record[0].to_string());
        for (i, field) in record.iter().skip(1).enumerate() {
            columns[i].push(field.to_string());
        }
    }

    if sample_ids.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "No samples found in metadata".to_string(),
        });
    }

    let mut metadata = SampleMetadata::new(sample_ids);
    for (name, values) in column_names.iter().zip(columns.into_iter()) {
        metadata.add_factor(name, values)?;
    }

    Ok(metadata)
}

/// Read a gene annotation table from a tab-delimited file.
/// Expected format: first column gene ids, remaining columns carried as
/// annotation strings into the top table.
pub fn read_gene_annotation<P: AsRef<Path>>(path: P) -> Result<GeneAnnotation> {
    let mut reader = open_reader(&path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(LimmaError::InvalidAnnotation {
            reason: "Annotation table has no columns".to_string(),
        });
    }
    let column_names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];

    for record in reader.records() {
        let record = record?;
        if record.len() != column_names.len() + 1 {
            return Err(LimmaError::InvalidAnnotation {
                reason: format!(
                    "Row {} has {} columns, expected {}",
                    gene_ids.len() + 2,
                    record.len(),
                    column_names.len() + 1
                ),
            });
        }
        gene_ids.push(record[0].to_string());
        for (i, field) in record.iter().skip(1).enumerate() {
            columns[i].push(field.to_string());
        }
    }

    let mut annotation = GeneAnnotation::new(gene_ids);
    for (name, values) in column_names.iter().zip(columns.into_iter()) {
        annotation.add_column(name, values)?;
    }

    Ok(annotation)
}

/// Format a float for output tables; non-finite values become NA
fn fmt_value(v: f64, precision: usize) -> String {
    if v.is_finite() {
        format!("{:.*}", precision, v)
    } else {
        "NA".to_string()
    }
}

/// Format a p-value in scientific notation; non-finite values become NA
fn fmt_pvalue(v: f64) -> String {
    if v.is_finite() {
        format!("{:.6e}", v)
    } else {
        "NA".to_string()
    }
}

/// Write a genes x samples expression matrix as a tab-delimited table
pub fn write_expression_matrix<P: AsRef<Path>>(
    path: P,
    gene_ids: &[String],
    sample_ids: &[String],
    matrix: ArrayView2<f64>,
) -> Result<()> {
    let (n_genes, n_samples) = matrix.dim();
    if gene_ids.len() != n_genes || sample_ids.len() != n_samples {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("{} gene ids and {} sample ids", n_genes, n_samples),
            got: format!("{} and {}", gene_ids.len(), sample_ids.len()),
        });
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?;

    let mut header = vec!["gene_id".to_string()];
    header.extend(sample_ids.iter().cloned());
    writer.write_record(&header)?;

    for (i, gene_id) in gene_ids.iter().enumerate() {
        let mut record = vec![gene_id.clone()];
        for j in 0..n_samples {
            record.push(fmt_value(matrix[[i, j]], 4));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a top table as a tab-delimited results file
pub fn write_top_table<P: AsRef<Path>>(path: P, table: &TopTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?;

    let mut header = vec![
        "gene_id".to_string(),
        "logFC".to_string(),
        "AveExpr".to_string(),
        "t".to_string(),
        "P.Value".to_string(),
        "adj.P.Val".to_string(),
    ];
    header.extend(table.annotation_columns.iter().cloned());
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![
            row.gene_id.clone(),
            fmt_value(row.log_fc, 6),
            fmt_value(row.ave_expr, 6),
            fmt_value(row.t, 6),
            fmt_pvalue(row.p_value),
            fmt_pvalue(row.adj_p_value),
        ];
        record.extend(row.annotation.iter().cloned());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TopTableRow;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_count_matrix_tsv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_read_count_matrix_rejects_text() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1").unwrap();
        writeln!(file, "gene1\tlots").unwrap();
        assert!(read_count_matrix(file.path()).is_err());
    }

    #[test]
    fn test_read_count_matrix_ragged_row() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1").unwrap();
        assert!(read_count_matrix(file.path()).is_err());
    }

    #[test]
    fn test_read_sample_metadata_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id,group,batch").unwrap();
        writeln!(file, "s1,control,b1").unwrap();
        writeln!(file, "s2,treated,b2").unwrap();

        let meta = read_sample_metadata(file.path()).unwrap();
        assert_eq!(meta.n_samples(), 2);
        assert_eq!(meta.factor_value("group", 1).unwrap(), "treated");
        assert_eq!(meta.levels("batch").unwrap(), vec!["b1", "b2"]);
    }

    #[test]
    fn test_read_gene_annotation_tsv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tsymbol\tchromosome").unwrap();
        writeln!(file, "g1\tAbc1\tchr1").unwrap();
        writeln!(file, "g2\tXyz9\tchrX").unwrap();

        let ann = read_gene_annotation(file.path()).unwrap();
        assert_eq!(ann.column_names(), &["symbol", "chromosome"]);
        assert_eq!(ann.value("g2", "chromosome"), "chrX");
    }

    #[test]
    fn test_write_expression_matrix_roundtrip() {
        let gene_ids = vec!["g1".to_string(), "g2".to_string()];
        let sample_ids = vec!["s1".to_string(), "s2".to_string()];
        let matrix = ndarray::array![[1.5, 2.5], [3.25, 4.0]];

        let file = NamedTempFile::new().unwrap();
        write_expression_matrix(file.path(), &gene_ids, &sample_ids, matrix.view()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "gene_id\ts1\ts2");
        assert_eq!(lines.next().unwrap(), "g1\t1.5000\t2.5000");

        // And it reads back as a count matrix
        let back = read_count_matrix(file.path()).unwrap();
        assert_eq!(back.n_genes(), 2);
        assert!((back.counts()[[1, 0]] - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_write_top_table_layout() {
        let table = TopTable {
            annotation_columns: vec!["symbol".to_string()],
            coefficient: "b - a".to_string(),
            rows: vec![TopTableRow {
                gene_id: "g1".to_string(),
                log_fc: 1.25,
                ave_expr: 5.5,
                t: 4.0,
                p_value: 0.001,
                adj_p_value: f64::NAN,
                annotation: vec!["Abc1".to_string()],
            }],
        };

        let file = NamedTempFile::new().unwrap();
        write_top_table(file.path(), &table).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "gene_id\tlogFC\tAveExpr\tt\tP.Value\tadj.P.Val\tsymbol"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("g1\t1.250000\t5.500000\t4.000000\t"));
        assert!(row.ends_with("\tNA\tAbc1"));
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_count_matrix(file.path()).is_err());
    }
}
