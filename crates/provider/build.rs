fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_dir = "../../proto";
    let tfplugin = format!("{proto_dir}/tfplugin6.proto");

    std::fs::create_dir_all("src/generated")?;
    println!("cargo:rerun-if-changed={tfplugin}");

    // Terraform is the client; only the Provider service is needed
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .out_dir("src/generated")
        .compile(&[tfplugin.as_str()], &[proto_dir])?;

    Ok(())
}
