use jwsig::{KeyPair, Signer, Verifier};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generate a new key pair and save it
    let keypair = KeyPair::generate();
    keypair.save_to_files("private_key.bin", "public_key.bin")?;

    // Sign a request body
    let signer = Signer::new(keypair);
    let body = br#"{"msg":"teste"}"#;
    let token = signer.sign(body, "demo-request")?;
    println!("x-jws-signature: {}", token);

    // Verify against the key read back from disk
    let verifier = Verifier::from_files(&["public_key.bin"][..])?;
    println!("Signature is valid: {}", verifier.verify(Some(&token), body));
    println!(
        "Signature is valid for a modified body: {}",
        verifier.verify(Some(&token), b"{\"msg\":\"other\"}")
    );

    Ok(())
}

// use these cargo dependencies
// [dependencies]
// jws_lib = { package = "jwsig", path = "path/to/jws_lib" }
