//! `ls-remote`: list a remote's refs without fetching.

use std::collections::BTreeMap;

use grit_odb::Oid;
use grit_wire::advert::Service;
use grit_wire::http::HttpClient;

use crate::callbacks::Callbacks;
use crate::errors::Result;
use crate::remote;
use crate::repo::Repository;

/// A remote's advertised refs (including `HEAD` and peeled tags as
/// `<name>^{}` entries).
pub fn ls_remote(
    repo: Option<&Repository>,
    client: &dyn HttpClient,
    url: &str,
    callbacks: &mut Callbacks,
) -> Result<BTreeMap<String, Oid>> {
    let caller = "grit.lsRemote";
    let advert = remote::get_remote_info(repo, client, url, Service::UploadPack, callbacks)
        .map_err(|e| e.with_caller(caller))?;
    let mut out = advert.refs;
    for (name, oid) in advert.peeled {
        out.insert(format!("{name}^{{}}"), oid);
    }
    Ok(out)
}
