mod dirty_worker;
mod index_worker;
mod watcher;
