use fitoverlay_track::synthetic::{encode_fit, steady_run, write_fit};
use fitoverlay_track::{parse_fit_bytes, parse_fit_file, GeoPoint, ParseOptions, Sample, TimeAligner};

const START_UNIX: i64 = 1_700_000_000;

#[test]
fn steady_run_decodes_every_field() {
    let bytes = encode_fit(&steady_run(9, 140.0), START_UNIX);
    let track = parse_fit_bytes(&bytes, &ParseOptions::default()).expect("synthetic FIT should parse");

    assert_eq!(track.len(), 10);
    assert_eq!(track.first().timestamp, 0.0);
    assert_eq!(track.last().timestamp, 9.0);
    assert_eq!(
        track.start_time().map(|t| t.timestamp()),
        Some(START_UNIX)
    );

    let s = &track.samples()[4];
    assert_eq!(s.heart_rate, Some(144.0));
    assert_eq!(s.cadence, Some(170.0));
    assert_eq!(s.power, Some(250.0));
    assert!((s.speed.unwrap() - 3.0).abs() < 1e-6);
    assert!((s.distance.unwrap() - 12.0).abs() < 1e-6);

    let p = s.position.unwrap();
    assert!((p.lat - 47.0).abs() < 1e-6);
    assert!(p.lon > 8.0);
}

#[test]
fn out_of_order_records_come_back_sorted() {
    let mut samples = steady_run(5, 100.0);
    samples.reverse();
    samples.swap(1, 3);

    let track = parse_fit_bytes(&encode_fit(&samples, START_UNIX), &ParseOptions::default())
        .expect("unsorted FIT should parse");

    let times: Vec<f64> = track.samples().iter().map(|s| s.timestamp).collect();
    assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let hrs: Vec<f64> = track.samples().iter().filter_map(|s| s.heart_rate).collect();
    assert_eq!(hrs, vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
}

#[test]
fn missing_fields_stay_unset() {
    let samples = vec![
        Sample {
            heart_rate: Some(120.0),
            ..Sample::at(0.0)
        },
        Sample {
            position: Some(GeoPoint::new(-33.9, 151.2)),
            power: Some(180.0),
            ..Sample::at(1.0)
        },
    ];
    let track = parse_fit_bytes(&encode_fit(&samples, START_UNIX), &ParseOptions::default())
        .expect("sparse FIT should parse");

    let first = &track.samples()[0];
    assert_eq!(first.heart_rate, Some(120.0));
    assert_eq!(first.position, None);
    assert_eq!(first.power, None);

    let second = &track.samples()[1];
    assert_eq!(second.heart_rate, None);
    let p = second.position.unwrap();
    assert!((p.lat + 33.9).abs() < 1e-6);
    assert!((p.lon - 151.2).abs() < 1e-6);
}

#[test]
fn file_without_records_is_rejected() {
    let bytes = encode_fit(&[], START_UNIX);
    let err = parse_fit_bytes(&bytes, &ParseOptions::default()).unwrap_err();
    assert_eq!(err.stage(), "parse");
}

#[test]
fn aligned_heart_rate_from_file_on_disk() {
    let dir = std::env::temp_dir().join(format!("fitoverlay-track-{}", std::process::id()));
    let path = dir.join("run.fit");
    write_fit(&path, &steady_run(9, 140.0), START_UNIX).expect("write fixture");

    let track = parse_fit_file(&path, &ParseOptions::default()).expect("parse fixture");
    let aligner = TimeAligner::new(&track, 0.0);
    let hr = aligner.sample_at(4.5).sample.heart_rate.unwrap();
    assert!((hr - 144.5).abs() < 1e-9);

    std::fs::remove_dir_all(&dir).ok();
}
