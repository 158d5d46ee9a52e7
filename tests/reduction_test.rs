mod common;

use approx::assert_relative_eq;
use camino::Utf8PathBuf;
use common::{mieze_counts, utf8_dir, write_cascade, CASCADE_HEADER};
use nredux::file_loader::{CascadeLoader, FileLoader};
use nredux::instrument::{Instrument, LoaderSettings, Mode};
use nredux::nredux_errors::ReductionError;
use nredux::reduction::bootstrap::BootstrapParams;
use nredux::reduction::job_result::{weighted_average, ResultKind};
use nredux::reduction::structure::{ExportLayout, ParamValue, Reduction, ReductionStructure};
use nredux::reduction::ReductionJob;
use nredux::roi::RoiSpec;
use nredux::sine_fit::FitBackend;
use nredux::uncertainty::{propagate_mult_div, Factor};

const CONTRASTS: [f64; 8] = [0.70, 0.65, 0.60, 0.55, 0.50, 0.45, 0.40, 0.35];

/// Three TOF files (numbers 1..=3) with echo times 0.1, 0.2, 0.4 and the same signal.
fn tof_series(dir: &tempfile::TempDir) -> Utf8PathBuf {
    let root = utf8_dir(dir);
    let counts = mieze_counts(&CONTRASTS, 0.8, 80.0);
    for (n, tau) in [(1, "0.1"), (2, "0.2"), (3, "0.4")] {
        let header = CASCADE_HEADER.replace("0.123", tau);
        write_cascade(&root, &format!("{n:08}.tof"), &counts, &header);
    }
    root
}

fn loader(root: Utf8PathBuf, foils: Vec<usize>) -> CascadeLoader<impl Fn(u64) -> Utf8PathBuf> {
    let settings = LoaderSettings::builder(Instrument::Reseda, Mode::Tof)
        .foils(foils)
        .build()
        .unwrap();
    CascadeLoader::new(move |n: u64| root.join(format!("{n:08}.tof")), settings).unwrap()
}

fn roi_job(result: ResultKind) -> ReductionJob {
    ReductionJob::roi(RoiSpec::Lrbt([58, 72, 58, 72]), FitBackend::default(), result)
}

#[test]
fn test_structure_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader(tof_series(&dir), vec![0, 2, 3]);
    let components = (1..=3).map(|n| {
        (
            &loader as &dyn FileLoader,
            n,
            roi_job(ResultKind::SelectiveAverage(vec![0, 2])),
        )
    });
    let mut structure = ReductionStructure::from_components(components).unwrap();
    assert_eq!(structure.len(), 3);

    structure.run_all().unwrap();
    for reduction in structure.reductions() {
        let result = reduction.result().unwrap();
        assert_eq!(result.fits().len(), 3);
        assert_relative_eq!(result.fits()[1].contrast, CONTRASTS[2], max_relative = 0.01);
        // channels 0 and 2 of the selection are foils 0 and 3
        assert!(result.contrast() < CONTRASTS[0] && result.contrast() > CONTRASTS[3]);
    }

    let params = structure.analyze(&[
        ("selector_lambda", "lambda"),
        ("sample", "sample"),
        ("selector_speed", "speed"),
        ("timechannels", "channels"),
    ]);
    assert_eq!(params["tau_M"], ParamValue::PerRun(vec![0.1, 0.2, 0.4]));
    assert_eq!(params["lambda"], ParamValue::Scalar(6.0));
    // text, quantities and integers are not collected
    assert_eq!(params["sample"], ParamValue::Scalar(0.0));
    assert_eq!(params["speed"], ParamValue::Scalar(0.0));
    assert_eq!(params["channels"], ParamValue::Scalar(0.0));

    let out = utf8_dir(&dir).join("series.txt");
    structure.export(&out, ExportLayout::Combined).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    let rows: Vec<Vec<f64>> = text
        .lines()
        .skip(1)
        .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len(), 3);
    // channels, lambda, sample, speed, tau_M, contrast, contrast_err
    assert_eq!(rows[2][4], 0.4);
    assert!(rows.iter().all(|r| r.len() == 7 && r[6] > 0.0));
}

#[test]
fn test_reruns_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader(tof_series(&dir), vec![0, 1]);

    let mut reduction = Reduction::new(&loader, 2, roi_job(ResultKind::AllAverage)).unwrap();
    let first = reduction.run().unwrap().clone();
    let second = reduction.run().unwrap().clone();
    assert_eq!(first, second);

    let (c, e) = weighted_average(first.channel_contrasts());
    assert_eq!((c, e), (first.contrast(), first.contrast_err()));
}

#[test]
fn test_seeded_bootstrap_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader(tof_series(&dir), vec![4, 5]);
    let params = BootstrapParams::builder().steps(20).seed(7).build().unwrap();
    let job = ReductionJob::bootstrap(params, FitBackend::default(), ResultKind::SelectFoil(0));

    let mut a = Reduction::new(&loader, 1, job.clone()).unwrap();
    let mut b = Reduction::new(&loader, 1, job).unwrap();
    let first = a.run().unwrap();
    let second = b.run().unwrap();
    assert_eq!(first, second);

    let summary = first.fits()[0].bootstrap.as_ref().unwrap();
    assert_eq!(summary.steps, 20);
    assert!(summary.valid > 0 && summary.valid <= 20);
    assert_relative_eq!(summary.estimate, CONTRASTS[4], max_relative = 0.02);
    assert_relative_eq!(first.contrast(), CONTRASTS[4], max_relative = 0.02);
    assert!(first.fits().iter().all(|f| f.bootstrap.as_ref() == Some(summary)));
}

#[test]
fn test_reduction_errors() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader(tof_series(&dir), vec![0, 1]);

    assert!(matches!(
        Reduction::new(&loader, 9, roi_job(ResultKind::AllAverage)),
        Err(ReductionError::IoError(_))
    ));

    let mut out_of_range = Reduction::new(&loader, 1, roi_job(ResultKind::SelectFoil(2))).unwrap();
    assert_eq!(
        out_of_range.run().err(),
        Some(ReductionError::ChannelIndexOutOfRange { index: 2, len: 2 })
    );
    assert!(out_of_range.result().is_none());
}

#[test]
fn test_roi_modes_are_exclusive() {
    assert!(matches!(
        RoiSpec::from_modes(Some([0, 0, 10, 10]), Some([0, 10, 0, 10]), None),
        Err(ReductionError::InvalidRoiSpecification(_))
    ));
    assert!(matches!(
        RoiSpec::from_modes(None, None, None),
        Err(ReductionError::InvalidRoiSpecification(_))
    ));
    assert_eq!(
        RoiSpec::from_modes(None, Some([20, 25, 54, 75]), None).unwrap(),
        RoiSpec::Lrbt([20, 25, 54, 75])
    );
}

#[test]
fn test_channel_aggregation_and_ratios() {
    let (c, e) = weighted_average([(0.5, 0.1), (0.7, 0.2)]);
    assert_relative_eq!(c, 0.54, epsilon = 1e-12);
    assert_relative_eq!(e, 125f64.powf(-0.5), epsilon = 1e-12);

    let (v, err) = propagate_mult_div(&[Factor::mul(1.0, 0.1), Factor::div(2.0, 0.2)]);
    assert_relative_eq!(v, 0.5, epsilon = 1e-12);
    assert_relative_eq!(err, 0.07071067811865477, epsilon = 1e-12);
}
