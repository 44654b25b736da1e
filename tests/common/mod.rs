//! Shared test helpers: repository builders and the in-memory smart-HTTP
//! server the protocol tests run against.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use grit::callbacks::Callbacks;
use grit::ops::{self, CommitParams};
use grit::repo::{InitOptions, Repository};
use grit::{grit_odb, grit_store, grit_wire};
use grit_odb::{Oid, PackFile, pack, pack_index};
use grit_store::{Backend as _, MemoryBackend};
use grit_wire::pktline::{self, Packet, PktReader, PktWriter};
use grit_wire::{HttpClient, HttpRequest, HttpResponse, WireError};

/// A memory-backed repository with a default identity.
pub fn memory_repo() -> Repository {
    let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
        .unwrap()
        .without_hooks();
    repo.update_config(|c| {
        c.set("user.name", "Test User")?;
        c.set("user.email", "test@example.com")
    })
    .unwrap();
    repo
}

/// A filesystem-backed repository in a fresh temp dir.
pub fn fs_repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::TempDir::new().unwrap();
    let gitdir = dir.path().join(".git");
    let backend = grit_store::FsBackend::new(gitdir, Some(dir.path().to_path_buf()));
    let repo = Repository::init(Box::new(backend), &InitOptions::default())
        .unwrap()
        .without_hooks();
    repo.update_config(|c| {
        c.set("user.name", "Test User")?;
        c.set("user.email", "test@example.com")
    })
    .unwrap();
    (dir, repo)
}

/// Write, stage, and commit one file; returns the commit OID.
pub fn commit_file(repo: &Repository, path: &str, content: &[u8], message: &str) -> Oid {
    repo.backend().write_workdir_file(path, content, false).unwrap();
    ops::add(repo, &[path]).unwrap();
    ops::commit(
        repo,
        &CommitParams {
            message,
            ..CommitParams::default()
        },
        &mut Callbacks::new(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Mock smart-HTTP server
// ---------------------------------------------------------------------------

/// An in-process smart-HTTP v1 server over a grit repository, reachable
/// through the `HttpClient` seam. Cloneable; all clones share the
/// underlying repository.
#[derive(Clone)]
pub struct MockServer {
    repo: Arc<Mutex<Repository>>,
    /// Extra capability tokens advertised for upload-pack.
    pub upload_caps: Vec<String>,
    /// Require this `Authorization` header; `None` disables auth.
    pub required_auth: Option<String>,
}

impl MockServer {
    /// A server over a fresh bare-ish memory repository.
    pub fn new() -> Self {
        let repo = Repository::init(Box::new(MemoryBackend::new()), &InitOptions::default())
            .unwrap()
            .without_hooks();
        repo.update_config(|c| {
            c.set("user.name", "Server")?;
            c.set("user.email", "server@example.com")
        })
        .unwrap();
        Self {
            repo: Arc::new(Mutex::new(repo)),
            upload_caps: vec!["shallow".to_owned()],
            required_auth: None,
        }
    }

    /// Run a closure against the server's repository.
    pub fn with_repo<T>(&self, f: impl FnOnce(&Repository) -> T) -> T {
        let repo = self.repo.lock().unwrap();
        f(&repo)
    }

    /// Seed the server with a couple of branches: `master` (two commits)
    /// and `test` (one extra commit). Returns (master tip, test tip).
    pub fn seed_fixture(&self) -> (Oid, Oid) {
        self.with_repo(|repo| {
            let first = commit_file(repo, "a.txt", b"one\n", "first");
            let master = commit_file(repo, "a.txt", b"two\n", "second");
            ops::create_branch(repo, "test", Some(&first.to_hex())).unwrap();
            // Advance `test` past master's base.
            grit::refs::write_symbolic(repo, "HEAD", "refs/heads/test", "").unwrap();
            // The working tree still holds master's state; rebuild it.
            let tree = repo.read_commit(&first).unwrap().tree;
            let options = grit::checkout::CheckoutOptions {
                force: true,
                ..grit::checkout::CheckoutOptions::default()
            };
            let plan = grit::checkout::plan(repo, None, tree, &options).unwrap();
            grit::checkout::execute(repo, &plan, &options).unwrap();
            let test = commit_file(repo, "b.txt", b"branch only\n", "on test");
            grit::refs::write_symbolic(repo, "HEAD", "refs/heads/master", "").unwrap();
            (master, test)
        })
    }

    fn advertisement(&self, service: &str) -> Vec<u8> {
        self.with_repo(|repo| {
            let mut writer = PktWriter::new();
            writer.text(&format!("# service={service}")).unwrap();
            let mut body = writer.into_bytes();
            body.extend_from_slice(pktline::FLUSH);

            let refs = grit::refs::list(repo, "refs/").unwrap();
            let head = grit::refs::resolve_opt(repo, "HEAD").unwrap();
            let default = grit::refs::current_branch(repo).unwrap();
            let mut caps = if service == "git-receive-pack" {
                "report-status delete-refs".to_owned()
            } else {
                self.upload_caps.join(" ")
            };
            if let Some(default) = &default {
                caps = format!("symref=HEAD:{default} {caps}");
            }
            let mut writer = PktWriter::new();
            if refs.is_empty() || head.is_none() {
                writer
                    .text(&format!("{} capabilities^{{}}\0{caps}", "0".repeat(40)))
                    .unwrap();
            } else {
                let mut first = true;
                if let Some(head) = head {
                    writer.text(&format!("{head} HEAD\0{caps}")).unwrap();
                    first = false;
                }
                for (name, oid) in refs {
                    if first {
                        writer.text(&format!("{oid} {name}\0{caps}")).unwrap();
                        first = false;
                    } else {
                        writer.text(&format!("{oid} {name}")).unwrap();
                    }
                }
            }
            writer.flush();
            body.extend_from_slice(&writer.into_bytes());
            body
        })
    }

    fn upload_pack(&self, request_body: &[u8]) -> Vec<u8> {
        self.with_repo(|repo| {
            let mut reader = PktReader::new();
            reader.feed(request_body);
            let mut wants = Vec::new();
            let mut haves = Vec::new();
            while let Ok(Some(packet)) = reader.next_packet() {
                let text = packet.text();
                if let Some(rest) = text.strip_prefix("want ") {
                    let hex = rest.split(' ').next().unwrap_or(rest);
                    wants.push(Oid::from_hex(hex).unwrap());
                } else if let Some(rest) = text.strip_prefix("have ") {
                    if let Ok(oid) = Oid::from_hex(rest.trim()) {
                        haves.push(oid);
                    }
                }
            }
            let known_haves: Vec<Oid> = haves
                .iter()
                .copied()
                .filter(|oid| repo.has_object(oid).unwrap_or(false))
                .collect();
            let commits = grit::revwalk::commits_between(repo, &wants, &known_haves).unwrap();
            let objects =
                grit::revwalk::objects_for_commits(repo, &commits, &known_haves).unwrap();
            let (pack_bytes, _) = pack::write_pack(repo.hash(), &objects).unwrap();

            let mut writer = PktWriter::new();
            writer.text("NAK").unwrap();
            let mut out = writer.into_bytes();
            out.extend_from_slice(&pack_bytes);
            out
        })
    }

    fn receive_pack(&self, request_body: &[u8]) -> Vec<u8> {
        self.with_repo(|repo| {
            let mut reader = PktReader::new();
            reader.feed(request_body);
            let mut commands: Vec<(Oid, Oid, String)> = Vec::new();
            loop {
                match reader.next_packet() {
                    Ok(Some(Packet::Flush)) | Ok(None) => break,
                    Ok(Some(Packet::Data(line))) => {
                        let line = match line.iter().position(|&b| b == 0) {
                            Some(nul) => &line[..nul],
                            None => &line[..],
                        };
                        let text = String::from_utf8_lossy(line);
                        let text = text.trim_end();
                        let mut parts = text.splitn(3, ' ');
                        if let (Some(old), Some(new), Some(name)) =
                            (parts.next(), parts.next(), parts.next())
                        {
                            commands.push((
                                Oid::from_hex(old).unwrap(),
                                Oid::from_hex(new).unwrap(),
                                name.to_owned(),
                            ));
                        }
                    }
                    _ => break,
                }
            }
            let pack_bytes = reader.take_remainder();
            let mut unpack_ok = true;
            if !pack_bytes.is_empty() {
                match PackFile::parse(pack_bytes, repo.hash()) {
                    Ok(pack) => {
                        let mut lookup =
                            |oid: &Oid| repo.read_object_opt(oid).ok().flatten();
                        match pack_index::index_pack(&pack, repo.hash(), &mut lookup) {
                            Ok((index, _)) => {
                                let name = format!("pack-{}", pack.checksum().to_hex());
                                repo.backend().write_pack(&name, pack.bytes()).unwrap();
                                repo.backend()
                                    .write_pack_index(&name, &index.serialize())
                                    .unwrap();
                            }
                            Err(_) => unpack_ok = false,
                        }
                    }
                    Err(_) => unpack_ok = false,
                }
            }

            let mut writer = PktWriter::new();
            writer
                .text(if unpack_ok { "unpack ok" } else { "unpack index-pack failed" })
                .unwrap();
            for (old, new, name) in &commands {
                if !unpack_ok {
                    writer.text(&format!("ng {name} unpacker error")).unwrap();
                    continue;
                }
                let current = grit::refs::resolve_opt(repo, name)
                    .unwrap()
                    .unwrap_or_else(|| repo.zero_oid());
                if current != *old {
                    writer.text(&format!("ng {name} fetch first")).unwrap();
                    continue;
                }
                if new.is_zero() {
                    grit::refs::delete(repo, name).unwrap();
                } else {
                    grit::refs::update(
                        repo,
                        name,
                        *new,
                        &grit::refs::UpdateOptions {
                            message: "push",
                            ..grit::refs::UpdateOptions::default()
                        },
                    )
                    .unwrap();
                }
                writer.text(&format!("ok {name}")).unwrap();
            }
            writer.flush();
            writer.into_bytes()
        })
    }

    fn respond(&self, status: u16, body: Vec<u8>, content_type: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body: Box::new(Cursor::new(body)),
        }
    }
}

impl HttpClient for MockServer {
    fn request(&self, request: HttpRequest) -> Result<HttpResponse, WireError> {
        if let Some(required) = &self.required_auth {
            let supplied = request
                .headers
                .iter()
                .find(|(name, _)| name == "Authorization")
                .map(|(_, value)| value.as_str());
            if supplied != Some(required.as_str()) {
                return Ok(self.respond(401, b"auth required".to_vec(), "text/plain"));
            }
        }
        let url = request.url.as_str();
        if url.contains("/info/refs?service=git-upload-pack") {
            // v1 only: the v2 ask in Git-Protocol is ignored, which is
            // exactly the downgrade path clients must handle.
            return Ok(self.respond(
                200,
                self.advertisement("git-upload-pack"),
                "application/x-git-upload-pack-advertisement",
            ));
        }
        if url.contains("/info/refs?service=git-receive-pack") {
            return Ok(self.respond(
                200,
                self.advertisement("git-receive-pack"),
                "application/x-git-receive-pack-advertisement",
            ));
        }
        if url.ends_with("/git-upload-pack") {
            return Ok(self.respond(
                200,
                self.upload_pack(&request.body),
                "application/x-git-upload-pack-result",
            ));
        }
        if url.ends_with("/git-receive-pack") {
            return Ok(self.respond(
                200,
                self.receive_pack(&request.body),
                "application/x-git-receive-pack-result",
            ));
        }
        Ok(self.respond(404, b"not found".to_vec(), "text/plain"))
    }
}

/// HTTP headers map for assertions.
pub fn header_map(headers: &[(String, String)]) -> HashMap<String, String> {
    headers.iter().cloned().collect()
}
