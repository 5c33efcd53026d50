fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use shata_protocol::{FileMetadata, WireMessage, decode, encode};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values
    /// (key order independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_metadata() {
        let msg: WireMessage = roundtrip_test("metadata.json");
        assert_eq!(
            msg,
            WireMessage::Metadata(FileMetadata {
                name: "photo.jpg".into(),
                size: 150_000,
                mime_type: "image/jpeg".into(),
            })
        );
    }

    #[test]
    fn fixture_chunk() {
        let msg: WireMessage = roundtrip_test("chunk.json");
        assert_eq!(msg, WireMessage::chunk(2, b"Hello, world!".to_vec()));
    }

    #[test]
    fn fixture_empty_chunk() {
        let msg: WireMessage = roundtrip_test("empty_chunk.json");
        assert_eq!(msg, WireMessage::chunk(0, Vec::new()));
    }

    #[test]
    fn fixture_complete() {
        let msg: WireMessage = roundtrip_test("complete.json");
        assert_eq!(msg, WireMessage::Complete);
    }

    #[test]
    fn metadata_without_mime_type_defaults_to_empty() {
        let msg = decode(read_fixture("metadata_without_mime.json").as_bytes()).unwrap();
        match msg {
            WireMessage::Metadata(m) => {
                assert_eq!(m.name, "notes");
                assert_eq!(m.size, 0);
                assert_eq!(m.mime_type, "");
            }
            other => panic!("expected metadata, got {other:?}"),
        }
    }

    #[test]
    fn codec_reads_every_fixture() {
        for name in [
            "metadata.json",
            "chunk.json",
            "empty_chunk.json",
            "complete.json",
            "metadata_without_mime.json",
        ] {
            let frame = read_fixture(name);
            let msg = decode(frame.as_bytes())
                .unwrap_or_else(|e| panic!("codec rejected {name}: {e}"));
            let encoded = encode(&msg).unwrap();
            assert_eq!(decode(&encoded).unwrap(), msg, "{name}");
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(decode(br#"{"type":"resume","index":3}"#).is_err());
    }
}
