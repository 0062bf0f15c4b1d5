//! TAR file integration tests
//!
//! Tests the tar source, which is also the universal backend for all sources.
//! Every source (Docker, nerdctl, tar) ultimately produces a tarball that gets
//! processed through the same pipeline tested here.

#[cfg(test)]
mod tests {
    use crate::integration::common::image_fixture::NOP;
    use crate::integration::common::ImageFixture;
    use anyhow::Result;
    use flate2::read::GzDecoder;
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::TempDir;
    use undockerizer::generator::arg_line::ArgLineError;
    use undockerizer::notifier::Notifier;
    use undockerizer::processor::{ProcessorOptions, ScriptProcessor};
    use undockerizer::sources::{Source, TarSource};

    const CONTAINER: &str = "5e1f0a2b3c4d";

    fn nop(instruction: &str) -> String {
        format!("{}{}", NOP, instruction)
    }

    fn web_image() -> ImageFixture {
        ImageFixture::new()
            .layer(
                "/bin/sh -c #(nop) ADD file:0a1b2c in / ",
                &[("etc/os-release", "ID=alpine")],
            )
            .nop("CMD [\"/bin/sh\"]")
            .nop("LABEL org.opencontainers.image.title=web")
            .nop("ENV APP_HOME=/srv/web")
            .nop("ARG RELEASE=stable")
            .nop("WORKDIR /srv/web")
            .layer(
                &nop("COPY --chown=web:webfile:9f8e7d in /srv/web "),
                &[("srv/web/index.html", "<h1>hi</h1>")],
            )
            .layer(
                "|1 RELEASE=stable /bin/sh -c echo $RELEASE > /srv/web/release",
                &[("srv/web/release", "stable")],
            )
            .nop("EXPOSE 8080/tcp")
            .nop("USER web")
            .nop("ENTRYPOINT [\"/srv/web/run.sh\"]")
            .container(CONTAINER)
            .cmd(&["--port", "8080"])
    }

    fn convert(tarball: &Path, output: &Path, options: &ProcessorOptions) -> Result<std::path::PathBuf> {
        let processor = ScriptProcessor::new(TarSource::new()?, Notifier::silent());
        processor.convert(tarball.to_str().unwrap(), output, options)
    }

    #[test]
    fn test_tar_source_creation() {
        let source = TarSource::new().expect("Should create TarSource");
        assert_eq!(source.name(), "tar");
        assert_eq!(source.script_name("/images/web app.tar"), "web-app.sh");
    }

    #[test]
    fn test_script_reproduces_history() -> Result<()> {
        let temp = TempDir::new()?;
        let tarball = web_image().build(temp.path(), "web.tar");
        let output = temp.path().join("out");

        let script_path = convert(&tarball, &output, &ProcessorOptions::default())?;
        assert_eq!(script_path, output.join("web.sh"));

        let script = fs::read_to_string(&script_path)?;
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        assert!(lines.contains(&"set -e"));

        let tmp = format!("$UNDOCKERIZER_WORKDIR/{}/{:064x}/layer.tar", CONTAINER, 7);
        let expected = [
            "# org.opencontainers.image.title=web".to_string(),
            "export APP_HOME=\"/srv/web\"".to_string(),
            "RELEASE=\"stable\"".to_string(),
            "mkdir -p /srv/web & cd /srv/web".to_string(),
            format!(
                "mkdir -p {tmp} && tar -xvf $UNDOCKERIZER_WORKDIR/{}_content/{:064x}/layer.tar -C {tmp}",
                CONTAINER, 7
            ),
            format!("chown -R web:web {tmp}/"),
            format!("cp -r {tmp}/* / && rm -rf {tmp}"),
            "( export RELEASE=stable; echo $RELEASE > /srv/web/release )".to_string(),
            "# Expose Ports: 8080/tcp".to_string(),
            "# USER web".to_string(),
            "UNDOCKERIZER_USER=\"web\"".to_string(),
            "# ENTRYPOINT: /srv/web/run.sh".to_string(),
            "# CMD: --port 8080".to_string(),
        ];

        // Emitted in history order
        let mut cursor = 0;
        for wanted in &expected {
            let found = lines[cursor..]
                .iter()
                .position(|line| *line == wanted.as_str())
                .unwrap_or_else(|| panic!("missing or out of order: {wanted}\n{script}"));
            cursor += found + 1;
        }

        // The base image's own layer is never replayed
        assert!(!script.contains(&format!("{:064x}", 1)));
        Ok(())
    }

    #[test]
    fn test_content_is_staged_next_to_script() -> Result<()> {
        let temp = TempDir::new()?;
        let tarball = web_image().build(temp.path(), "web.tar");
        let output = temp.path().join("out");

        let script_path = convert(&tarball, &output, &ProcessorOptions::default())?;

        let staged = output
            .join(format!("{}_content", CONTAINER))
            .join(format!("{:064x}/layer.tar", 7));
        assert!(staged.is_file(), "Layer archive should be staged");

        let mut archive = tar_rs::Archive::new(File::open(&staged)?);
        let names: Vec<String> = archive
            .entries()?
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["srv/web/index.html".to_string()]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&script_path)?.permissions().mode();
            assert_eq!(mode & 0o111, 0o111, "Script should be executable");
        }

        assert!(!output.join("web.tar.gz").exists());
        Ok(())
    }

    #[test]
    fn test_archive_bundle() -> Result<()> {
        let temp = TempDir::new()?;
        let tarball = web_image().build(temp.path(), "web.tar");
        let output = temp.path().join("out");

        let options = ProcessorOptions {
            archive: true,
            script_name: Some("setup.sh".to_string()),
            ..Default::default()
        };
        convert(&tarball, &output, &options)?;

        let bundle = output.join("setup.tar.gz");
        assert!(bundle.is_file());

        let mut archive = tar_rs::Archive::new(GzDecoder::new(File::open(&bundle)?));
        let names: Vec<String> = archive
            .entries()?
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "setup.sh".to_string(),
                format!("{}_content/{:064x}/layer.tar", CONTAINER, 7),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_buildkit_image_guards_secrets() -> Result<()> {
        let temp = TempDir::new()?;
        let tarball = ImageFixture::new()
            .nop("CMD [\"node\"]")
            .empty("WORKDIR /app")
            .buildkit()
            .layer(
                "RUN /bin/sh -c npm ci --userconfig /run/secrets/npmrc # buildkit",
                &[("app/node_modules/.keep", "")],
            )
            .buildkit()
            .build(temp.path(), "node.tar");
        let output = temp.path().join("out");

        let script = fs::read_to_string(convert(&tarball, &output, &ProcessorOptions::default())?)?;
        assert!(script.contains("echo \"WARN: The image could be generated with docker build secrets.\" >&2"));
        assert!(script.contains("if [ ! -e \"/run/secrets/npmrc\" ]; then"));
        assert!(script.contains("\nmkdir -p /app & cd /app\n"));
        assert!(script.contains("\nnpm ci --userconfig /run/secrets/npmrc # buildkit\n"));
        // The anchoring CMD is consumed and the config has none
        assert!(!script.contains("# CMD:"));
        Ok(())
    }

    #[test]
    fn test_identical_copy_steps_replay_their_own_layers() -> Result<()> {
        let temp = TempDir::new()?;
        let copy_line = "COPY config.json /etc/app/ # buildkit";
        let tarball = ImageFixture::new()
            .nop("CMD [\"sh\"]")
            .layer(copy_line, &[("etc/app/config.json", "v1")])
            .buildkit()
            .layer("RUN /bin/sh -c rm /etc/app/config.json # buildkit", &[])
            .buildkit()
            .layer(copy_line, &[("etc/app/config.json", "v2")])
            .buildkit()
            .container(CONTAINER)
            .build(temp.path(), "twice.tar");
        let output = temp.path().join("out");

        let script = fs::read_to_string(convert(&tarball, &output, &ProcessorOptions::default())?)?;
        let extracts: Vec<&str> = script
            .lines()
            .filter(|line| line.contains("tar -xvf"))
            .collect();
        assert_eq!(extracts.len(), 2);
        assert!(extracts[0].contains(&format!("{}_content/{:064x}/layer.tar", CONTAINER, 2)));
        assert!(extracts[1].contains(&format!("{}_content/{:064x}/layer.tar", CONTAINER, 4)));

        let content = output.join(format!("{}_content", CONTAINER));
        for (index, expected) in [(2, "v1"), (4, "v2")] {
            let staged = content.join(format!("{:064x}/layer.tar", index));
            let mut archive = tar_rs::Archive::new(File::open(&staged)?);
            let mut entry = archive.entries()?.next().unwrap()?;
            let mut body = String::new();
            std::io::Read::read_to_string(&mut entry, &mut body)?;
            assert_eq!(body, expected);
        }
        Ok(())
    }

    #[test]
    fn test_undecodable_arg_line_fails_conversion() -> Result<()> {
        let temp = TempDir::new()?;
        let tarball = ImageFixture::new()
            .nop("CMD [\"sh\"]")
            .nop("ENV A=1")
            .layer("/bin/sh -c rm -rf /opt/old", &[])
            .layer("|3 A=1 /bin/sh -c make", &[("usr/bin/make", "")])
            .build(temp.path(), "broken.tar");
        let output = temp.path().join("out");

        let err = convert(&tarball, &output, &ProcessorOptions::default())
            .err()
            .unwrap();
        assert!(err.downcast_ref::<ArgLineError>().is_some());

        // No partial script, and no leftover temp file
        assert!(!output.join("broken.sh").exists());
        assert_eq!(fs::read_dir(&output)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_tar_source_with_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        let result = convert(
            Path::new("/path/that/definitely/does/not/exist.tar"),
            &temp.path().join("out"),
            &ProcessorOptions::default(),
        );
        assert!(result.is_err());
        assert!(!temp.path().join("out").exists());
    }
}
