use resolution_forensics::{
    detect_file, error::Result, find_method, parameters::Parameters, report::DetectionReport,
};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "evidences/upscaled.png".to_string());
    let method = find_method(args.next().as_deref().unwrap_or("sign"))?;
    let params = match args.next() {
        Some(json) => Parameters::from_json(&json)?,
        None => Parameters::default(),
    };

    let results = detect_file(&path, None, Some(method), Some(&params))?;
    let report = DetectionReport::new(method.name, &results);

    println!("{}", report);
    println!("{}", report.to_json().unwrap_or_default());

    Ok(())
}
