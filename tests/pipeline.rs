//! End-to-end stage tests over small on-disk fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use fi_decoupling::app::pipeline::{run_all, run_analysis, run_preprocess, run_render};
use fi_decoupling::domain::{AnalysisConfig, PreprocessConfig, RenderConfig};
use fi_decoupling::error::{EXIT_EMPTY, EXIT_FORMAT, EXIT_INSUFFICIENT, EXIT_IO};
use fi_decoupling::io::{
    DEFAULT_VEHICLE_YEAR_PATTERN, ELECTRICITY_FILE, EMISSIONS_FILE, MERGED_FILE, VEHICLES_FILE,
    read_merged_csv,
};
use fi_decoupling::plot::{FIG_LAG, FIG_ROLLING, FIG_SCATTER_ELECTRICITY, FIG_SCATTER_VEHICLES, FIG_TIMESERIES};

/// `(year, emissions, electricity, vehicles)`
type Row = (i32, f64, f64, u64);

const FIVE_YEARS: [Row; 5] = [
    (2020, 2.0, 1.0, 10),
    (2021, 4.0, 2.0, 30),
    (2022, 5.0, 4.0, 20),
    (2023, 4.0, 5.0, 50),
    (2024, 5.0, 8.0, 40),
];

fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

/// Emissions rows are written out of year order, with non-road noise and an
/// out-of-range year.
fn emissions_csv(rows: &[Row]) -> String {
    let mut out = String::from(
        "\"Greenhouse gas emissions by category\"\n\n\
\"Year\",\"Emission category\",\"Greenhouse gas\",\"Emission, thousand tonnes of CO2 eq. (GWP=AR5)\"\n\
\"1999\",\"1A3b Road transportation\",\"Total\",\"99\"\n",
    );
    for &(year, e, _, _) in rows.iter().rev() {
        out.push_str(&format!("\"{year}\",\"1A3b Road transportation\",\"Total\",\"{e}\"\n"));
        out.push_str(&format!("\"{year}\",\"1A3a Domestic aviation\",\"Total\",\"123\"\n"));
    }
    out
}

fn electricity_csv(rows: &[Row], with_total: bool) -> Vec<u8> {
    let mut out = String::from(
        "\"Electricity consumption by sector (GWh)\"\n\n\
\"Year\",\"Electricity consumption sector\",\"Quantity (GWh)\"\n",
    );
    for &(year, _, el, _) in rows {
        if with_total {
            out.push_str(&format!("\"{year}\",\"Total consumption (kulutus yhteensä)\",\"{el}\"\n"));
        }
        out.push_str(&format!("\"{year}\",\"Teollisuus ja rakentaminen\",\"555\"\n"));
    }
    latin1(&out)
}

fn vehicles_csv(rows: &[Row], skip_year: Option<i32>) -> Vec<u8> {
    let kept: Vec<&Row> = rows.iter().filter(|r| Some(r.0) != skip_year).collect();
    let mut header = String::from("\"Vehicle class\",\"Region\"");
    let mut total = String::from("\"All automobiles\",\"MAINLAND FINLAND\"");
    let mut cars = String::from("\"Passenger cars\",\"MAINLAND FINLAND\"");
    let mut uusimaa = String::from("\"All automobiles\",\"Uusimaa\"");
    for &&(year, _, _, v) in &kept {
        header.push_str(&format!(",\"{year} Number\""));
        total.push_str(&format!(",\"{v}\""));
        cars.push_str(",\"1\"");
        uusimaa.push_str(",\"2\"");
    }
    let text = format!(
        "\"First registrations of vehicles (Åland excluded)\"\n\n{header}\n{cars}\n{uusimaa}\n{total}\n"
    );
    latin1(&text)
}

struct Fixture {
    _dir: tempfile::TempDir,
    data: PathBuf,
    out: PathBuf,
}

fn fixture(rows: &[Row], missing_vehicle_year: Option<i32>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let out = dir.path().join("out");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join(EMISSIONS_FILE), emissions_csv(rows)).unwrap();
    fs::write(data.join(ELECTRICITY_FILE), electricity_csv(rows, true)).unwrap();
    fs::write(data.join(VEHICLES_FILE), vehicles_csv(rows, missing_vehicle_year)).unwrap();
    Fixture { _dir: dir, data, out }
}

fn preprocess_config(data: &Path, out: &Path) -> PreprocessConfig {
    PreprocessConfig {
        emissions_path: data.join(EMISSIONS_FILE),
        electricity_path: data.join(ELECTRICITY_FILE),
        vehicles_path: data.join(VEHICLES_FILE),
        out_dir: out.to_path_buf(),
        vehicle_year_pattern: DEFAULT_VEHICLE_YEAR_PATTERN.to_string(),
    }
}

fn analysis_config(out: &Path) -> AnalysisConfig {
    AnalysisConfig {
        in_csv: out.join(MERGED_FILE),
        out_dir: out.to_path_buf(),
        rolling_window: 5,
        max_lag: 3,
    }
}

fn render_config(out: &Path) -> RenderConfig {
    RenderConfig {
        in_csv: out.join(MERGED_FILE),
        out_dir: out.join("figures"),
        width: 400,
        height: 300,
        rolling_window: 5,
        max_lag: 3,
    }
}

#[test]
fn five_year_run_produces_every_artifact() {
    let fx = fixture(&FIVE_YEARS, None);
    let out = run_all(
        &preprocess_config(&fx.data, &fx.out),
        &analysis_config(&fx.out),
        &render_config(&fx.out),
    )
    .unwrap();

    let merged = fs::read_to_string(fx.out.join(MERGED_FILE)).unwrap();
    assert!(merged.starts_with("year,emissions_ktco2e,electricity_gwh,vehicles_first_reg\n"));

    let table = read_merged_csv(&fx.out.join(MERGED_FILE)).unwrap();
    let rows: Vec<Row> = table
        .records()
        .iter()
        .map(|r| (r.year, r.emissions_ktco2e, r.electricity_gwh, r.vehicles_first_reg))
        .collect();
    assert_eq!(rows, FIVE_YEARS.to_vec());

    // Pearson(emissions, electricity) = 10 / sqrt(30 * 6)
    let summary = fs::read_to_string(fx.out.join("analysis_summary.txt")).unwrap();
    assert!(summary.contains("0.745356"), "{summary}");
    assert!(summary.contains("Years: 2020-2024 (n=5)"), "{summary}");
    assert_eq!(summary, out.analysis.summary);

    for name in [
        "emissions_ktco2e.csv",
        "electricity_gwh.csv",
        "vehicles_first_reg.csv",
        "analysis_summary.json",
        "correlations_summary.csv",
        "merged_with_derivatives.csv",
        "lagcorr_electricity.csv",
        "lagcorr_vehicles.csv",
    ] {
        assert!(fx.out.join(name).is_file(), "missing {name}");
    }

    let correlations = fs::read_to_string(fx.out.join("correlations_summary.csv")).unwrap();
    assert!(correlations.contains("levels_electricity,0.745356,5"), "{correlations}");
    assert!(correlations.contains("levels_vehicles,0.516398,5"), "{correlations}");

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fx.out.join("analysis_summary.json")).unwrap()).unwrap();
    assert_eq!(json["n_years"], 5);

    for name in [
        FIG_TIMESERIES,
        FIG_SCATTER_ELECTRICITY,
        FIG_SCATTER_VEHICLES,
        FIG_ROLLING,
        FIG_LAG,
    ] {
        assert!(fx.out.join("figures").join(name).is_file(), "missing figure {name}");
    }
    assert!(out.render.failed.is_empty());
}

#[test]
fn preprocess_is_byte_identical_across_runs() {
    let fx = fixture(&FIVE_YEARS, None);
    let second = fx.out.with_file_name("out2");

    let a = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap();
    let b = run_preprocess(&preprocess_config(&fx.data, &second)).unwrap();
    assert_eq!(a.written.len(), 4);

    for (pa, pb) in a.written.iter().zip(&b.written) {
        assert_eq!(pa.file_name(), pb.file_name());
        assert_eq!(fs::read(pa).unwrap(), fs::read(pb).unwrap(), "{}", pa.display());
    }

    // Rerunning into the same directory overwrites with identical bytes.
    let before = fs::read(fx.out.join(MERGED_FILE)).unwrap();
    run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap();
    assert_eq!(fs::read(fx.out.join(MERGED_FILE)).unwrap(), before);
}

#[test]
fn year_missing_from_one_source_is_dropped_downstream() {
    let rows: Vec<Row> = (2015..=2024)
        .map(|y| {
            let i = (y - 2015) as f64;
            (y, 100.0 - 3.0 * i + (i * 1.7).sin(), 80.0 + i * i * 0.5, 1000 + ((i * 37.0) as u64 % 11) * 10)
        })
        .collect();
    let fx = fixture(&rows, Some(2023));

    let pre = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap();
    let years = pre.table.years();
    assert_eq!(years.len(), 9);
    assert!(!years.contains(&2023));
    assert!(years.windows(2).all(|w| w[0] < w[1]));

    let analysis = run_analysis(&analysis_config(&fx.out)).unwrap();
    assert_eq!(analysis.analysis.n_years, 9);
    assert!(analysis.analysis.derived.iter().all(|r| r.year != 2023));

    let derived = fs::read_to_string(fx.out.join("merged_with_derivatives.csv")).unwrap();
    assert!(!derived.lines().any(|l| l.starts_with("2023,")));
    // No 2023 row, so 2024 has no year-over-year change.
    let last = analysis.analysis.derived.last().unwrap();
    assert_eq!(last.year, 2024);
    assert!(last.d_electricity.is_none());
    assert!(derived.lines().any(|l| l.starts_with("2024,") && l.contains(",NA,")));
    let d2022 = analysis.analysis.derived[7].d_electricity.unwrap();
    assert!((d2022 - (rows[7].2 - rows[6].2)).abs() < 1e-9);
    // 2016..=2022 have deltas; 2015 and 2024 do not.
    assert_eq!(analysis.analysis.deltas.n, 7);

    let lag0 = analysis.analysis.lags[0].lags.iter().find(|l| l.lag == 0).unwrap();
    assert_eq!(lag0.n, 9);
}

#[test]
fn merged_years_are_unique_and_ascending() {
    let fx = fixture(&FIVE_YEARS, None);
    let pre = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap();
    assert_eq!(pre.table.years(), vec![2020, 2021, 2022, 2023, 2024]);
}

#[test]
fn missing_input_is_an_io_error() {
    let fx = fixture(&FIVE_YEARS, None);
    fs::remove_file(fx.data.join(VEHICLES_FILE)).unwrap();
    let err = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_IO);
    assert!(!fx.out.join(MERGED_FILE).exists());
}

#[test]
fn electricity_without_total_rows_is_a_format_error() {
    let fx = fixture(&FIVE_YEARS, None);
    fs::write(fx.data.join(ELECTRICITY_FILE), electricity_csv(&FIVE_YEARS, false)).unwrap();
    let err = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_FORMAT);
}

#[test]
fn disjoint_sources_fail_with_empty_merge() {
    let fx = fixture(&FIVE_YEARS, None);
    let early: Vec<Row> = FIVE_YEARS.iter().map(|&(y, e, el, v)| (y - 10, e, el, v)).collect();
    fs::write(fx.data.join(VEHICLES_FILE), vehicles_csv(&early, None)).unwrap();
    let err = run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_EMPTY);
    assert!(!fx.out.exists());
}

#[test]
fn too_few_years_for_regression_writes_nothing() {
    let fx = fixture(&FIVE_YEARS[..3], None);
    run_preprocess(&preprocess_config(&fx.data, &fx.out)).unwrap();

    let err = run_analysis(&analysis_config(&fx.out)).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_INSUFFICIENT);
    assert!(!fx.out.join("analysis_summary.txt").exists());
}

#[test]
fn plot_stage_needs_a_readable_table() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_render(&render_config(dir.path())).unwrap_err();
    assert_eq!(err.exit_code(), EXIT_IO);
}
