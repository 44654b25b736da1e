//! The smart-HTTP protocol engine.
//!
//! Policy above the wire codec: advertisement retrieval with silent
//! v2→v1 downgrade, fetch negotiation (wants, have batches, shallow
//! bounds), pack ingestion (streamed to a temp file, then indexed),
//! remote-tracking updates with rollback, pruning, FETCH_HEAD, and push
//! with report-status parsing.
//!
//! The HTTP client itself is injected ([`HttpClient`]); the only silent
//! retries anywhere are a single 401 retry after `onAuth` and the
//! protocol downgrade.

use std::collections::BTreeMap;
use std::io::{Read as _, Write as _};

use grit_odb::{Oid, PackFile, pack_index};
use grit_wire::WireError;
use grit_wire::advert::{self, Advertisement, LsRefsOptions, Service};
use grit_wire::http::{self, HttpClient, HttpRequest, HttpResponse};
use grit_wire::pktline::PktReader;
use grit_wire::receive_pack::{self, UpdateCommand};
use grit_wire::sideband;
use grit_wire::upload_pack::{self, DepthSpec, UploadPackRequest};

use grit_store::Backend as _;
use crate::callbacks::{Callbacks, PrePushRef};
use crate::errors::{Error, ErrorKind, Result};
use crate::refs::{self, UpdateOptions};
use crate::repo::Repository;
use crate::revwalk;

/// The agent string grit announces.
pub const AGENT: &str = concat!("grit/", env!("CARGO_PKG_VERSION"));

/// Upper bound of haves sent per negotiation round.
const HAVE_BATCH: usize = 32;

// ---------------------------------------------------------------------------
// Transport helpers
// ---------------------------------------------------------------------------

struct Transport<'a> {
    client: &'a dyn HttpClient,
    base: String,
    auth: Option<String>,
}

impl<'a> Transport<'a> {
    fn new(
        repo: Option<&Repository>,
        client: &'a dyn HttpClient,
        url: &str,
    ) -> Result<Self> {
        let base = http::normalize_url(url)
            .map_err(|url| Error::new(ErrorKind::UnknownTransport { url }))?;
        let base = match repo.and_then(|r| {
            r.config().get("http.corsproxy").map(ToOwned::to_owned)
        }) {
            Some(proxy) => http::apply_cors_proxy(&proxy, &base),
            None => base,
        };
        Ok(Self {
            client,
            base,
            auth: None,
        })
    }

    /// Perform a request; on 401, consult `onAuth` once and retry.
    fn send(
        &mut self,
        callbacks: &mut Callbacks,
        build: &dyn Fn(&str, Option<&str>) -> HttpRequest,
    ) -> Result<HttpResponse> {
        let response = self.client.request(build(&self.base, self.auth.as_deref()))?;
        if response.status == 401 && self.auth.is_none() {
            if let Some(credentials) = callbacks.auth(&self.base) {
                self.auth = Some(credentials.to_basic_header());
                let retried = self.client.request(build(&self.base, self.auth.as_deref()))?;
                return check_status(retried);
            }
        }
        check_status(response)
    }
}

fn check_status(response: HttpResponse) -> Result<HttpResponse> {
    if response.status >= 400 {
        let status = response.status;
        let message = response
            .into_bytes()
            .map(|b| String::from_utf8_lossy(&b).trim().to_owned())
            .unwrap_or_default();
        return Err(Error::new(ErrorKind::Http { status, message }));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// get_remote_info
// ---------------------------------------------------------------------------

/// Fetch a remote's advertisement. Protocol v2 is attempted first for
/// upload-pack; any v2 parse or ls-refs failure silently downgrades to a
/// fresh v1 exchange.
pub fn get_remote_info(
    repo: Option<&Repository>,
    client: &dyn HttpClient,
    url: &str,
    service: Service,
    callbacks: &mut Callbacks,
) -> Result<Advertisement> {
    let mut transport = Transport::new(repo, client, url)?;
    if service == Service::UploadPack {
        match remote_info_v2(&mut transport, callbacks) {
            Ok(advert) => return Ok(advert),
            Err(e) => {
                tracing::debug!(error = %e, "protocol v2 failed, downgrading to v1");
            }
        }
    }
    remote_info_v1(&mut transport, service, callbacks)
}

fn remote_info_v2(
    transport: &mut Transport<'_>,
    callbacks: &mut Callbacks,
) -> Result<Advertisement> {
    let response = transport.send(callbacks, &|base, auth| {
        http::info_refs_request(base, Service::UploadPack, true, auth)
    })?;
    let body = response.into_bytes()?;
    let packets = grit_wire::pktline::parse_all(&body).map_err(Error::from)?;
    let packets = advert::strip_service_banner(packets, Service::UploadPack)?;
    let caps = advert::parse(&packets)?;
    if caps.protocol != 2 {
        // A v1 advertisement is already complete; keep it.
        return Ok(caps);
    }
    // Refs come from ls-refs in v2.
    let request_body = advert::ls_refs_request(
        &LsRefsOptions {
            symrefs: true,
            peel: true,
            prefixes: Vec::new(),
        },
        AGENT,
    )?;
    let response = transport.send(callbacks, &|base, auth| {
        http::service_post(base, Service::UploadPack, request_body.clone(), true, auth)
    })?;
    let body = response.into_bytes()?;
    let packets = grit_wire::pktline::parse_all(&body).map_err(Error::from)?;
    let mut refs = advert::parse_ls_refs(&packets)?;
    refs.capabilities = caps.capabilities;
    Ok(refs)
}

fn remote_info_v1(
    transport: &mut Transport<'_>,
    service: Service,
    callbacks: &mut Callbacks,
) -> Result<Advertisement> {
    let response = transport.send(callbacks, &|base, auth| {
        http::info_refs_request(base, service, false, auth)
    })?;
    let body = response.into_bytes()?;
    let packets = grit_wire::pktline::parse_all(&body).map_err(Error::from)?;
    let packets = advert::strip_service_banner(packets, service)?;
    Ok(advert::parse(&packets)?)
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Options for [`fetch`].
#[derive(Debug, Default)]
pub struct FetchOptions {
    /// Remote name (`"origin"`), used for config lookup and tracking
    /// refs.
    pub remote: String,
    /// Explicit URL; defaults to `remote.<name>.url` config.
    pub url: Option<String>,
    /// Fetch a single branch (with `ref_name`) instead of everything.
    pub single_branch: bool,
    /// The branch to fetch when `single_branch`, or the ref to
    /// prioritize for FETCH_HEAD.
    pub ref_name: Option<String>,
    /// Also fetch tags.
    pub tags: bool,
    /// Remove remote-tracking refs the server no longer advertises.
    pub prune: bool,
    /// Shallow bounds.
    pub depth: DepthSpec,
    /// Abort token.
    pub abort: crate::callbacks::AbortSignal,
}

/// What a fetch did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// The remote's default branch (`refs/heads/...`), when advertised.
    pub default_branch: Option<String>,
    /// Tip of the primary fetched ref.
    pub fetch_head: Option<Oid>,
    /// Description recorded in FETCH_HEAD for that tip.
    pub fetch_head_description: Option<String>,
    /// Remote-tracking refs removed by pruning.
    pub pruned: Vec<String>,
}

/// Fetch from a remote over smart HTTP.
pub fn fetch(
    repo: &Repository,
    client: &dyn HttpClient,
    options: &FetchOptions,
    callbacks: &mut Callbacks,
) -> Result<FetchResult> {
    let url = resolve_url(repo, &options.remote, options.url.as_deref())?;
    let advert = get_remote_info(Some(repo), client, &url, Service::UploadPack, callbacks)?;

    // An empty repository advertises nothing.
    if advert.refs.is_empty() {
        return Ok(FetchResult::default());
    }

    let wants = select_wants(repo, &advert, options)?;
    let default_branch = advert.default_branch().map(ToOwned::to_owned);
    if wants.is_empty() {
        // Everything requested is already present; still record
        // tracking refs and FETCH_HEAD.
        let result = update_tracking(repo, &advert, options, &[])?;
        return Ok(FetchResult {
            default_branch,
            ..result
        });
    }

    if options.depth.is_shallow() && !advert.capabilities.has("shallow") && advert.protocol == 1 {
        return Err(Error::new(ErrorKind::RemoteCapability {
            capability: "shallow".to_owned(),
        }));
    }

    // Haves: local ref tips plus a bounded slice of recent history.
    let haves = collect_haves(repo)?;

    let capabilities = match upload_pack::choose_capabilities(
        &advert.capabilities,
        &options.depth,
        AGENT,
    ) {
        Ok(caps) => caps,
        Err(capability) => {
            return Err(Error::new(ErrorKind::RemoteCapability { capability }));
        }
    };

    let request = UploadPackRequest {
        wants: wants.iter().map(|(_, oid)| *oid).collect(),
        capabilities,
        shallow: repo.shallow()?.into_iter().collect(),
        depth: options.depth.clone(),
        haves,
        done: true,
    };
    let body = if advert.protocol == 2 {
        upload_pack::fetch_request_v2(&request, AGENT, true)?
    } else {
        request.to_bytes()?
    };

    let mut transport = Transport::new(Some(repo), client, &url)?;
    let response = transport.send(callbacks, &|base, auth| {
        http::service_post(
            base,
            Service::UploadPack,
            body.clone(),
            advert.protocol == 2,
            auth,
        )
    })?;

    let (prelude, pack_bytes) = read_fetch_response(response, &options.abort, callbacks)?;

    // Apply shallow/unshallow updates atomically.
    if !prelude.shallow.is_empty() || !prelude.unshallow.is_empty() {
        let mut shallow = repo.shallow()?;
        shallow.extend(prelude.shallow.iter().copied());
        for oid in &prelude.unshallow {
            shallow.remove(oid);
        }
        repo.write_shallow(&shallow)?;
    }

    if !pack_bytes.is_empty() {
        ingest_pack(repo, pack_bytes, &options.abort, callbacks)?;
    }

    let result = update_tracking(repo, &advert, options, &wants)?;
    Ok(FetchResult {
        default_branch,
        ..result
    })
}

fn resolve_url(repo: &Repository, remote: &str, explicit: Option<&str>) -> Result<String> {
    if let Some(url) = explicit {
        return Ok(url.to_owned());
    }
    repo.config()
        .get(&format!("remote.{remote}.url"))
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound {
                kind: "remote",
                id: remote.to_owned(),
            })
        })
}

/// Which advertised refs to request, as `(refname, oid)`.
fn select_wants(
    repo: &Repository,
    advert: &Advertisement,
    options: &FetchOptions,
) -> Result<Vec<(String, Oid)>> {
    let mut wants = Vec::new();
    for (name, oid) in &advert.refs {
        let relevant = if let Some(ref_name) = &options.ref_name {
            let full = format!("refs/heads/{ref_name}");
            if options.single_branch {
                name == &full || name == ref_name
            } else {
                name.starts_with("refs/heads/") || (options.tags && name.starts_with("refs/tags/"))
            }
        } else if name.starts_with("refs/heads/") {
            true
        } else {
            options.tags && name.starts_with("refs/tags/")
        };
        if !relevant {
            continue;
        }
        if repo.has_object(oid)? {
            // Nothing new behind this tip, but tracking still updates.
            continue;
        }
        wants.push((name.clone(), *oid));
    }
    Ok(wants)
}

fn collect_haves(repo: &Repository) -> Result<Vec<Oid>> {
    let mut tips = Vec::new();
    for (_, oid) in refs::list(repo, "refs/")? {
        tips.push(oid);
    }
    let mut haves = revwalk::reachable_commits(repo, &tips, HAVE_BATCH * 4)?;
    haves.truncate(HAVE_BATCH * 4);
    Ok(haves)
}

/// Drain a fetch response: parse the prelude, then collect pack bytes
/// (sideband or raw), streaming progress to the callbacks.
fn read_fetch_response(
    mut response: HttpResponse,
    abort: &crate::callbacks::AbortSignal,
    callbacks: &mut Callbacks,
) -> Result<(upload_pack::FetchPrelude, Vec<u8>)> {
    let mut reader = PktReader::new();
    let mut packets = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        abort.check()?;
        let n = response.body.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        reader.feed(&chunk[..n]);
        loop {
            match reader.next_packet() {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(WireError::Pktline(_)) => {
                    // Raw pack data after the acks in v1 without
                    // sideband: stop framing, keep the remainder.
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    let trailing = reader.take_remainder();

    let (prelude, pack_start) = upload_pack::parse_fetch_prelude(&packets)?;
    let mut progress = |line: &str| callbacks.progress(line.trim_end(), 0, None);
    let mut pack = sideband::demux(&packets[pack_start..], &mut progress)?;
    pack.extend_from_slice(&trailing);
    // v1 servers without sideband send the pack unframed after a NAK
    // inside `trailing`; servers with sideband leave `trailing` empty.
    if !pack.is_empty() && !pack.starts_with(b"PACK") {
        if let Some(at) = find_pack_start(&pack) {
            pack.drain(..at);
        }
    }
    Ok((prelude, pack))
}

fn find_pack_start(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"PACK")
}

/// Stream pack bytes to a temp file, then parse, index, and store them.
fn ingest_pack(
    repo: &Repository,
    pack_bytes: Vec<u8>,
    abort: &crate::callbacks::AbortSignal,
    callbacks: &mut Callbacks,
) -> Result<()> {
    // Stage to disk first: a partially transferred pack must never land
    // in the object store.
    let mut staged = tempfile::NamedTempFile::new()?;
    staged.write_all(&pack_bytes)?;
    staged.flush()?;
    drop(pack_bytes);
    let mut bytes = Vec::new();
    staged.reopen()?.read_to_end(&mut bytes)?;

    let pack = PackFile::parse(bytes, repo.hash())?;
    let total = u64::from(pack.object_count());
    callbacks.progress("Receiving objects", total, Some(total));

    abort.check()?;
    let mut lookup = |oid: &Oid| repo.read_object_opt(oid).ok().flatten();
    let (index, _objects) = pack_index::index_pack(&pack, repo.hash(), &mut lookup)?;
    callbacks.progress("Resolving deltas", total, Some(total));

    let name = format!("pack-{}", pack.checksum().to_hex());
    repo.backend().write_pack(&name, pack.bytes())?;
    repo.backend().write_pack_index(&name, &index.serialize())?;
    Ok(())
}

/// Update remote-tracking refs (rolling back on mid-way failure), prune,
/// and write FETCH_HEAD.
fn update_tracking(
    repo: &Repository,
    advert: &Advertisement,
    options: &FetchOptions,
    wants: &[(String, Oid)],
) -> Result<FetchResult> {
    let remote = &options.remote;
    let mut applied: Vec<(String, Option<Oid>)> = Vec::new();
    let mut apply = |name: String, oid: Oid| -> Result<()> {
        let previous = refs::resolve_opt(repo, &name)?;
        if previous == Some(oid) {
            return Ok(());
        }
        let update = refs::update(
            repo,
            &name,
            oid,
            &UpdateOptions {
                message: "update by fetch",
                ..UpdateOptions::default()
            },
        );
        match update {
            Ok(()) => {
                applied.push((name, previous));
                Ok(())
            }
            Err(e) => {
                // Roll back what already moved; a half-applied tracking
                // set is worse than a stale one.
                for (name, previous) in applied.drain(..).rev() {
                    match previous {
                        Some(oid) => {
                            let _ = refs::update(
                                repo,
                                &name,
                                oid,
                                &UpdateOptions {
                                    message: "fetch rollback",
                                    suppress_reflog: true,
                                    ..UpdateOptions::default()
                                },
                            );
                        }
                        None => {
                            let _ = refs::delete(repo, &name);
                        }
                    }
                }
                Err(e)
            }
        }
    };

    for (name, oid) in &advert.refs {
        if let Some(branch) = name.strip_prefix("refs/heads/") {
            if options.single_branch
                && options.ref_name.as_deref().is_some_and(|r| r != branch)
            {
                continue;
            }
            apply(format!("refs/remotes/{remote}/{branch}"), *oid)?;
        } else if options.tags && name.starts_with("refs/tags/") {
            if refs::resolve_opt(repo, name)?.is_none() {
                apply(name.clone(), *oid)?;
            }
        }
    }

    // Prune tracking refs the server no longer has.
    let mut pruned = Vec::new();
    if options.prune {
        let prefix = format!("refs/remotes/{remote}/");
        for (name, _) in refs::list(repo, &prefix)? {
            let Some(branch) = name.strip_prefix(&prefix) else {
                continue;
            };
            if branch == "HEAD" {
                continue;
            }
            if !advert.refs.contains_key(&format!("refs/heads/{branch}")) {
                refs::delete(repo, &name)?;
                pruned.push(name);
            }
        }
    }

    // FETCH_HEAD: primary ref first (the asked-for branch, else the
    // remote default, else the first want).
    let primary = options
        .ref_name
        .as_ref()
        .map(|r| format!("refs/heads/{r}"))
        .or_else(|| advert.default_branch().map(ToOwned::to_owned))
        .or_else(|| wants.first().map(|(name, _)| name.clone()));
    let mut fetch_head = None;
    let mut fetch_head_description = None;
    if let Some(primary) = primary {
        if let Some(oid) = advert.refs.get(&primary) {
            let short = primary.strip_prefix("refs/heads/").unwrap_or(&primary);
            let description = format!("branch '{short}' of {}", options.remote);
            let line = format!("{}\t\t{description}\n", oid.to_hex());
            repo.backend().write_state_file("FETCH_HEAD", line.as_bytes())?;
            fetch_head = Some(*oid);
            fetch_head_description = Some(description);
        }
    }

    Ok(FetchResult {
        default_branch: advert.default_branch().map(ToOwned::to_owned),
        fetch_head,
        fetch_head_description,
        pruned,
    })
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Options for [`push`].
#[derive(Debug, Default)]
pub struct PushOptions {
    /// Remote name.
    pub remote: String,
    /// Explicit URL; defaults to `remote.<name>.url`.
    pub url: Option<String>,
    /// Local ref (or revision) to push; `None` with `delete` pushes a
    /// deletion of `remote_ref`.
    pub local_ref: Option<String>,
    /// Destination ref; defaults to the resolved local ref name.
    pub remote_ref: Option<String>,
    /// Delete the remote ref.
    pub delete: bool,
    /// Skip the fast-forward requirement.
    pub force: bool,
    /// Abort token.
    pub abort: crate::callbacks::AbortSignal,
}

/// Per-ref push outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushResult {
    /// Whether unpack and every ref update succeeded.
    pub ok: bool,
    /// `refname -> error` (`None` for accepted refs).
    pub refs: BTreeMap<String, Option<String>>,
}

/// Push to a remote over smart HTTP.
pub fn push(
    repo: &Repository,
    client: &dyn HttpClient,
    options: &PushOptions,
    callbacks: &mut Callbacks,
) -> Result<PushResult> {
    let url = resolve_url(repo, &options.remote, options.url.as_deref())?;
    let advert = get_remote_info(Some(repo), client, &url, Service::ReceivePack, callbacks)?;
    if !advert.capabilities.has("report-status") && !advert.capabilities.is_empty() {
        return Err(Error::new(ErrorKind::RemoteCapability {
            capability: "report-status".to_owned(),
        }));
    }

    // Resolve the triplet.
    let (new_oid, local_name) = if options.delete {
        (repo.zero_oid(), None)
    } else {
        let source = options.local_ref.as_deref().unwrap_or("HEAD");
        let full = refs::expand_name(repo, source)?;
        match refs::resolve_opt(repo, source)? {
            Some(oid) => (oid, full),
            // An unborn HEAD has nothing to push; that is a successful
            // no-op, not an error.
            None if options.local_ref.is_none() => {
                return Ok(PushResult {
                    ok: true,
                    refs: BTreeMap::new(),
                });
            }
            None => {
                return Err(Error::new(ErrorKind::NotFound {
                    kind: "ref",
                    id: source.to_owned(),
                }));
            }
        }
    };
    let remote_ref = options
        .remote_ref
        .clone()
        .or_else(|| match &local_name {
            Some(name) if name != "HEAD" => Some(name.clone()),
            _ => refs::current_branch(repo).ok().flatten(),
        })
        .ok_or_else(|| Error::new(ErrorKind::MissingParameter { name: "remoteRef" }))?;
    let old_oid = advert
        .refs
        .get(&remote_ref)
        .copied()
        .unwrap_or_else(|| repo.zero_oid());

    // Nothing to do?
    if old_oid == new_oid {
        let mut refs_map = BTreeMap::new();
        refs_map.insert(remote_ref, None);
        return Ok(PushResult {
            ok: true,
            refs: refs_map,
        });
    }

    // Fast-forward requirement: when we know the old tip and are not
    // forcing, it must be an ancestor of what we push.
    if !options.force && !options.delete && !old_oid.is_zero() {
        if !repo.has_object(&old_oid)? {
            return Err(Error::new(ErrorKind::FastForward));
        }
        if !revwalk::is_descendant(repo, old_oid, new_oid)? {
            return Err(Error::new(ErrorKind::FastForward));
        }
    }

    // Pre-push veto.
    let veto_refs = vec![PrePushRef {
        local_ref: local_name.clone().unwrap_or_else(|| "HEAD".to_owned()),
        remote_ref: remote_ref.clone(),
        new_oid: new_oid.to_hex(),
        old_oid: old_oid.to_hex(),
    }];
    if !callbacks.pre_push(&veto_refs) {
        return Err(Error::new(ErrorKind::Aborted));
    }

    // Objects the server lacks: everything reachable from the new tip
    // minus everything reachable from tips we share with the server.
    let pack = if options.delete {
        None
    } else {
        options.abort.check()?;
        let mut shared: Vec<Oid> = Vec::new();
        for oid in advert.refs.values() {
            if repo.has_object(oid)? {
                shared.push(*oid);
            }
        }
        let commits = revwalk::commits_between(repo, &[new_oid], &shared)?;
        let objects = revwalk::objects_for_commits(repo, &commits, &shared)?;
        callbacks.progress("Writing objects", objects.len() as u64, Some(objects.len() as u64));
        let (bytes, _records) = grit_odb::pack::write_pack(repo.hash(), &objects)?;
        Some(bytes)
    };

    let mut capabilities = vec!["report-status".to_owned()];
    let sideband = advert.capabilities.has("side-band-64k");
    if sideband {
        capabilities.push("side-band-64k".to_owned());
    }
    if advert.capabilities.has("delete-refs") || options.delete {
        capabilities.push("delete-refs".to_owned());
    }
    capabilities.push(format!("agent={AGENT}"));

    let commands = vec![UpdateCommand {
        old: old_oid,
        new: new_oid,
        name: remote_ref.clone(),
    }];
    let body = receive_pack::build_request(&commands, &capabilities, pack.as_deref())?;

    let mut transport = Transport::new(Some(repo), client, &url)?;
    let response = transport.send(callbacks, &|base, auth| {
        http::service_post(base, Service::ReceivePack, body.clone(), false, auth)
    })?;
    let raw = response.into_bytes()?;

    // Reports may arrive wrapped in sideband band 1.
    let report_bytes = if sideband {
        let packets = grit_wire::pktline::parse_all(&raw).map_err(Error::from)?;
        let mut progress = |line: &str| callbacks.progress(line.trim_end(), 0, None);
        sideband::demux(&packets, &mut progress)?
    } else {
        raw
    };
    let report = receive_pack::parse_report(&report_bytes)?;

    let mut result = PushResult {
        ok: report.ok(),
        refs: BTreeMap::new(),
    };
    for (name, outcome) in &report.refs {
        result
            .refs
            .insert(name.clone(), outcome.as_ref().err().cloned());
    }
    if let Some(Err(message)) = &report.unpack {
        return Err(Error::new(ErrorKind::Protocol {
            detail: format!("unpack {message}"),
        }));
    }

    // Mirror accepted updates into remote-tracking refs.
    if result.ok {
        if let Some(branch) = remote_ref.strip_prefix("refs/heads/") {
            let tracking = format!("refs/remotes/{}/{branch}", options.remote);
            if options.delete {
                refs::delete(repo, &tracking)?;
            } else {
                refs::update(
                    repo,
                    &tracking,
                    new_oid,
                    &UpdateOptions {
                        message: "update by push",
                        ..UpdateOptions::default()
                    },
                )?;
            }
        }
    }
    Ok(result)
}
